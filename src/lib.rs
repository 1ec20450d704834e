//! Device abstraction and synchronous sample streaming for USB SDR
//! transceivers.

pub mod buffers;
pub mod config;
pub mod engine;
pub mod error;
pub mod hal;
pub mod observability;

pub use buffers::StreamConfig;
pub use config::{ChannelSettings, DeviceProfile, OpenOptions};
pub use engine::{MetaFlags, MetaStatus, Metadata, StreamState};
pub use error::{Error, ErrorKind, Result};
pub use hal::{
    Channel, ChannelLayout, Device, DeviceManager, DeviceSelector, Direction, RationalRate,
    SampleFormat,
};
