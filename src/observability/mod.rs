pub mod diagnostics;
pub mod metrics;

pub use diagnostics::Diagnostics;
pub use metrics::{StreamMetrics, StreamStats};
