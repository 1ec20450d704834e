pub mod metadata;
pub mod scheduler;
pub mod state;
pub mod sync;
pub mod worker;

pub use metadata::{MetaFlags, MetaStatus, Metadata};
pub use scheduler::{RetuneRequest, RetuneScheduler};
pub use state::StreamState;
pub use sync::SyncStream;
pub use worker::{Worker, WorkerMode};
