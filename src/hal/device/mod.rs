//! Open device handle.
//!
//! A [`Device`] owns one board driver and one transport. Command-path
//! operations serialize on a single control mutex; the RX and TX sample
//! streams have locks of their own so a blocked `sync_rx` never holds up
//! configuration calls.

mod rf;
mod streaming;

use log::LevelFilter;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::devinfo::{DeviceInfo, UsbSpeed};
use super::firmware::{self, FirmwareImage};
use super::traits::{Board, Transport};
use super::types::{Channel, Direction, FlashGeometry, Version};
use crate::config::DeviceProfile;
use crate::engine::scheduler::RetuneScheduler;
use crate::engine::sync::SyncStream;
use crate::error::{Error, Result};
use crate::observability::{Diagnostics, StreamMetrics};

struct Control {
    /// `None` once the device has been closed
    board: Option<Box<dyn Board>>,
    retunes: RetuneScheduler,
    /// Channels whose module is currently enabled
    enabled: BTreeSet<Channel>,
    diagnostics: Diagnostics,
}

/// Borrowed view of the device handed to command-path operations
pub(crate) struct Session<'a> {
    board: &'a mut dyn Board,
    transport: &'a dyn Transport,
    retunes: &'a mut RetuneScheduler,
    enabled: &'a mut BTreeSet<Channel>,
}

impl Session<'_> {
    fn check_channel(&self, channel: Channel) -> Result<()> {
        let count = self.board.channel_count(channel.direction);
        if channel.index as usize >= count {
            return Err(Error::InvalidParameter(format!(
                "{} has no channel {}",
                self.board.name(),
                channel
            )));
        }
        Ok(())
    }

    fn direction_enabled(&self, direction: Direction) -> bool {
        self.enabled.iter().any(|channel| channel.direction == direction)
    }

    /// Apply every retune whose timestamp has been reached.
    /// Returns how many were applied.
    fn service_retunes(&mut self) -> Result<usize> {
        let rx = self.transport.read_timestamp(Direction::Rx)?;
        let tx = self.transport.read_timestamp(Direction::Tx)?;
        let due = self.retunes.take_due(|direction| match direction {
            Direction::Rx => rx,
            Direction::Tx => tx,
        });

        let mut applied = 0;
        for request in due {
            let result = match request.quick_tune {
                Some(tune) => self.board.apply_quick_tune(self.transport, request.channel, &tune),
                None => self.board.set_frequency(self.transport, request.channel, request.frequency),
            };
            match result {
                Ok(()) => applied += 1,
                Err(err) => log::warn!(
                    target: crate::observability::diagnostics::COMMAND_TARGET,
                    "scheduled retune of {} to {} Hz at {} failed: {}",
                    request.channel,
                    request.frequency,
                    request.timestamp,
                    err
                ),
            }
        }
        Ok(applied)
    }
}

pub struct Device {
    info: DeviceInfo,
    board_name: &'static str,
    flash: FlashGeometry,
    transport: Arc<dyn Transport>,
    control: Mutex<Control>,
    rx: SyncStream,
    tx: SyncStream,
}

impl Device {
    /// Wrap a transport and an already initialized board
    pub(crate) fn new(transport: Arc<dyn Transport>, board: Box<dyn Board>, verbosity: LevelFilter) -> Self {
        let info = transport.info();
        let stream_metrics =
            |direction: Direction| Arc::new(StreamMetrics::new(format!("{}:{}", info.serial, direction)));

        Self {
            board_name: board.name(),
            flash: board.flash_geometry(),
            rx: SyncStream::new(Direction::Rx, stream_metrics(Direction::Rx)),
            tx: SyncStream::new(Direction::Tx, stream_metrics(Direction::Tx)),
            control: Mutex::new(Control {
                board: Some(board),
                retunes: RetuneScheduler::new(),
                enabled: BTreeSet::new(),
                diagnostics: Diagnostics::new(info.serial.clone(), verbosity),
            }),
            transport,
            info,
        }
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `op` with the control lock held and log its outcome
    pub(crate) fn command<T>(&self, op: &str, f: impl FnOnce(&mut Session<'_>) -> Result<T>) -> Result<T> {
        let mut control = self.lock_control();
        let Control {
            board,
            retunes,
            enabled,
            diagnostics,
        } = &mut *control;

        let result = match board.as_deref_mut() {
            Some(board) => f(&mut Session {
                board,
                transport: self.transport.as_ref(),
                retunes,
                enabled,
            }),
            None => Err(Error::InvalidState("device is closed".into())),
        };
        diagnostics.record(op, &result);
        result
    }

    fn stream(&self, direction: Direction) -> &SyncStream {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn serial(&self) -> &str {
        &self.info.serial
    }

    pub fn board_name(&self) -> &'static str {
        self.board_name
    }

    pub fn flash_geometry(&self) -> FlashGeometry {
        self.flash
    }

    pub fn speed(&self) -> UsbSpeed {
        self.transport.speed()
    }

    pub fn is_open(&self) -> bool {
        self.lock_control().board.is_some()
    }

    pub fn verbosity(&self) -> LevelFilter {
        self.lock_control().diagnostics.level()
    }

    pub fn set_verbosity(&self, level: LevelFilter) {
        self.lock_control().diagnostics.set_level(level);
    }

    /// Release the device.
    ///
    /// Streams are stopped first, then the board quiesces the hardware while
    /// the transport is still usable, then the transport is closed. A second
    /// call fails with `InvalidState`.
    pub fn close(&self) -> Result<()> {
        let mut control = self.lock_control();
        let Some(mut board) = control.board.take() else {
            return Err(Error::InvalidState("device is already closed".into()));
        };

        let rx = self.rx.teardown();
        let tx = self.tx.teardown();
        let quiesced = board.close(self.transport.as_ref());
        self.transport.close();
        drop(board);

        control.retunes.clear();
        control.enabled.clear();
        control.diagnostics.info("closed");
        quiesced.and(rx).and(tx)
    }

    pub fn fw_version(&self) -> Result<Version> {
        self.command("fw_version", |s| s.board.fw_version(s.transport))
    }

    pub fn fpga_version(&self) -> Result<Version> {
        self.command("fpga_version", |s| s.board.fpga_version(s.transport))
    }

    pub fn is_fpga_configured(&self) -> Result<bool> {
        self.command("is_fpga_configured", |s| s.board.is_fpga_configured(s.transport))
    }

    /// Load an FPGA bitstream from `path`
    pub fn load_fpga(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = firmware::read_file(path)?;
        self.command("load_fpga", |s| s.board.load_fpga(s.transport, &image))
    }

    /// Validate a firmware image and write it to the device's flash
    pub fn flash_firmware(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = firmware::read_file(path)?;
        let parsed = FirmwareImage::parse(&image)?;
        let capacity = self.flash.size_bytes as usize;

        self.command("flash_firmware", |s| {
            if image.len() > capacity {
                return Err(Error::InvalidParameter(format!(
                    "{} byte image exceeds {} byte flash",
                    image.len(),
                    capacity
                )));
            }
            log::debug!(
                "flashing {} sections, entry {:#x}",
                parsed.sections.len(),
                parsed.entry
            );
            s.transport.flash_firmware(&image)
        })
    }

    /// Store an FPGA bitstream from `path` in flash for autoload
    pub fn flash_fpga(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = firmware::read_file(path)?;
        self.command("flash_fpga", |s| s.board.flash_fpga(s.transport, &image))
    }

    /// Remove the autoloaded FPGA bitstream from flash
    pub fn erase_stored_fpga(&self) -> Result<()> {
        self.command("erase_stored_fpga", |s| s.board.erase_stored_fpga(s.transport))
    }

    pub fn stored_fpga_size(&self) -> Result<Option<usize>> {
        self.command("stored_fpga_size", |s| s.board.stored_fpga_size(s.transport))
    }

    /// Reset the device. Streams are stopped and pending retunes dropped.
    ///
    /// The reset goes ahead even if a stream fails to stop; the first error
    /// is returned afterwards.
    pub fn device_reset(&self) -> Result<()> {
        self.command("device_reset", |s| {
            let rx = self.rx.stop();
            let tx = self.tx.stop();
            s.retunes.clear();
            s.enabled.clear();
            let reset = s.board.reset(s.transport);
            rx.and(tx).and(reset)
        })
    }

    /// Apply a stored profile on top of the current settings
    pub fn apply_profile(&self, profile: &DeviceProfile) -> Result<()> {
        if let Some(path) = &profile.fpga_image {
            self.load_fpga(path)?;
        }
        if let Some(mode) = profile.loopback {
            self.set_loopback(mode)?;
        }

        for settings in &profile.channels {
            let channel = settings.channel;
            if let Some(rate) = settings.sample_rate {
                self.set_sample_rate(channel, rate)?;
            }
            if let Some(bandwidth) = settings.bandwidth {
                self.set_bandwidth(channel, bandwidth)?;
            }
            if let Some(frequency) = settings.frequency {
                self.set_frequency(channel, frequency)?;
            }
            if let Some(mode) = settings.gain_mode {
                self.set_gain_mode(channel, mode)?;
            }
            if let Some(gain) = settings.gain {
                self.set_gain(channel, gain)?;
            }
            if let Some(port) = &settings.rf_port {
                self.set_rf_port(channel, port)?;
            }
        }

        if let Some(timeout_ms) = profile.stream_timeout_ms {
            for direction in [Direction::Rx, Direction::Tx] {
                if self.stream(direction).config().is_some() {
                    self.set_stream_timeout(direction, timeout_ms)?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                log::warn!("closing {} on drop: {}", self.info.serial, err);
            }
        }
    }
}
