//! Simulated hardware for tests and demos.

pub mod backend;
pub mod transport;

pub use backend::SimBackend;
pub use transport::{SimTransport, TxRecord};
