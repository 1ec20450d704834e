use std::sync::{Arc, Mutex};

use super::transport::SimTransport;
use crate::error::{Error, Result};
use crate::hal::devinfo::{BackendKind, DeviceInfo};
use crate::hal::traits::{Backend, Transport};

/// Backend serving a fixed set of simulated devices
#[derive(Default)]
pub struct SimBackend {
    devices: Mutex<Vec<Arc<SimTransport>>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: Arc<SimTransport>) -> Self {
        self.add(device);
        self
    }

    pub fn add(&self, device: Arc<SimTransport>) {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(device);
    }
}

impl Backend for SimBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sim
    }

    fn probe(&self) -> Result<Vec<DeviceInfo>> {
        let devices = self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(devices
            .iter()
            .enumerate()
            .map(|(instance, device)| DeviceInfo {
                instance: instance as u32,
                ..device.info()
            })
            .collect())
    }

    fn open(&self, info: &DeviceInfo, reset_on_open: bool) -> Result<Arc<dyn Transport>> {
        let devices = self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let device = devices
            .iter()
            .find(|device| device.info().serial == info.serial)
            .ok_or_else(|| Error::NoDevice(format!("no simulated device {}", info.serial)))?;

        if device.is_claimed() {
            return Err(Error::Io(format!("device {} is already in use", info.serial)));
        }
        device.claim(reset_on_open);
        log::debug!("sim: opened {}", info);
        Ok(device.clone())
    }
}
