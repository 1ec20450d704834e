pub mod boards;
pub mod device;
pub mod device_manager;
pub mod devinfo;
pub mod firmware;
pub mod interleave;
pub mod registry;
pub mod sim;
pub mod traits;
pub mod trigger;
pub mod types;

pub use device::Device;
pub use device_manager::DeviceManager;
pub use devinfo::{BackendKind, DeviceInfo, DeviceSelector, UsbIds, UsbSpeed};
pub use registry::BoardRegistry;
pub use traits::{Backend, Board, Transport};
pub use trigger::{Trigger, TriggerRole, TriggerSignal, TriggerState};
pub use types::{
    Band, Channel, ChannelLayout, Correction, Direction, FlashGeometry, GainMode, GainStage,
    Loopback, QuickTune, Range, RationalRate, RxMux, SampleFormat, TuningMode, Version,
};
