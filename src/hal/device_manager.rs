use std::sync::Arc;

use super::device::Device;
use super::devinfo::{DeviceInfo, DeviceSelector};
use super::registry::BoardRegistry;
use super::traits::{Backend, Board, Transport};
use crate::config::OpenOptions;
use crate::error::{Error, Result};
use crate::observability::diagnostics::COMMAND_TARGET;

/// Entry point for discovering and opening devices
pub struct DeviceManager {
    backends: Vec<Arc<dyn Backend>>,
    boards: BoardRegistry,
}

impl DeviceManager {
    /// Manager with the built-in boards and no backends
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            boards: BoardRegistry::with_defaults(),
        }
    }

    pub fn with_boards(boards: BoardRegistry) -> Self {
        Self {
            backends: Vec::new(),
            boards,
        }
    }

    pub fn register_backend(&mut self, backend: Arc<dyn Backend>) {
        self.backends.push(backend);
    }

    pub fn register_board<F>(&mut self, name: &'static str, ids: &[super::devinfo::UsbIds], factory: F)
    where
        F: Fn() -> Box<dyn Board> + Send + Sync + 'static,
    {
        self.boards.register(name, ids, factory);
    }

    /// Devices visible through every registered backend
    pub fn probe(&self) -> Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();
        for backend in &self.backends {
            match backend.probe() {
                Ok(found) => devices.extend(found),
                Err(err) => {
                    log::warn!(target: COMMAND_TARGET, "{} probe failed: {}", backend.kind(), err)
                }
            }
        }
        Ok(devices)
    }

    /// Open the first device matching `selector`
    pub fn open(&self, selector: &DeviceSelector, options: &OpenOptions) -> Result<Device> {
        for backend in &self.backends {
            let found = match backend.probe() {
                Ok(found) => found,
                Err(err) => {
                    log::warn!(target: COMMAND_TARGET, "{} probe failed: {}", backend.kind(), err);
                    continue;
                }
            };
            let Some(info) = found.into_iter().find(|info| selector.matches(info)) else {
                continue;
            };
            return self.open_with(backend.as_ref(), &info, options);
        }
        Err(Error::NoDevice(format!("nothing matches {:?}", selector)))
    }

    /// Open from an identifier string such as `"sim:serial=f00d"`
    pub fn open_str(&self, identifier: &str, options: &OpenOptions) -> Result<Device> {
        let selector: DeviceSelector = identifier.parse()?;
        self.open(&selector, options)
    }

    fn open_with(&self, backend: &dyn Backend, info: &DeviceInfo, options: &OpenOptions) -> Result<Device> {
        let transport = backend.open(info, options.reset_on_open)?;
        let board = match self.init_board(transport.as_ref()) {
            Ok(board) => board,
            Err(err) => {
                transport.close();
                return Err(err);
            }
        };

        log::info!(target: COMMAND_TARGET, "opened {} as {}", info, board.name());
        let device = Device::new(transport, board, options.verbosity);

        if let Some(profile) = &options.profile {
            if let Err(err) = device.apply_profile(profile) {
                let _ = device.close();
                return Err(err);
            }
        }
        Ok(device)
    }

    fn init_board(&self, transport: &dyn Transport) -> Result<Box<dyn Board>> {
        let ids = transport.info().ids;
        let mut board = self
            .boards
            .find(ids)
            .ok_or_else(|| Error::NoDevice(format!("no board driver for USB id {}", ids)))?;
        board.open(transport)?;
        Ok(board)
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
