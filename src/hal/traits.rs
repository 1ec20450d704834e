use std::sync::Arc;
use std::time::Duration;

use super::boards::common;
use super::devinfo::{BackendKind, DeviceInfo, UsbSpeed};
use super::trigger::{Trigger, TriggerRole, TriggerSignal, TriggerState};
use super::types::{
    Band, Channel, Correction, Direction, FlashGeometry, GainMode, GainStage, Loopback,
    QuickTune, Range, RationalRate, RxMux, TuningMode, Version,
};
use crate::error::{Error, Result};

/// Device discovery and open, one implementation per transport family
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// List devices reachable through this backend
    fn probe(&self) -> Result<Vec<DeviceInfo>>;

    /// Claim the device described by `info`
    fn open(&self, info: &DeviceInfo, reset_on_open: bool) -> Result<Arc<dyn Transport>>;
}

/// An open link to one device: register access plus raw sample transfers.
///
/// Transfers are whole byte buffers. `submit` hands a buffer to the device,
/// `poll_complete` returns buffers in submission order once the device is done
/// with them (filled for RX, consumed for TX), and `cancel_transfers` gives
/// back everything still outstanding.
pub trait Transport: Send + Sync {
    fn info(&self) -> DeviceInfo;

    fn speed(&self) -> UsbSpeed;

    fn is_open(&self) -> bool;

    fn close(&self);

    fn read_register(&self, addr: u16) -> Result<u32>;

    fn write_register(&self, addr: u16, value: u32) -> Result<()>;

    /// Current hardware sample counter for a direction
    fn read_timestamp(&self, direction: Direction) -> Result<u64>;

    fn submit(&self, direction: Direction, buffer: Vec<u8>) -> Result<()>;

    /// Wait up to `timeout` for the oldest outstanding transfer.
    /// `Ok(None)` means nothing completed in time.
    fn poll_complete(&self, direction: Direction, timeout: Duration) -> Result<Option<Vec<u8>>>;

    fn cancel_transfers(&self, direction: Direction) -> Vec<Vec<u8>>;

    fn load_fpga(&self, _image: &[u8]) -> Result<()> {
        Err(Error::Unsupported("FPGA loading over this transport".into()))
    }

    fn flash_firmware(&self, _image: &[u8]) -> Result<()> {
        Err(Error::Unsupported("firmware flashing over this transport".into()))
    }

    /// Erase `len` bytes of SPI flash; both ends must sit on erase blocks
    fn erase_flash(&self, _offset: u32, _len: usize) -> Result<()> {
        Err(Error::Unsupported("flash access over this transport".into()))
    }

    fn write_flash(&self, _offset: u32, _data: &[u8]) -> Result<()> {
        Err(Error::Unsupported("flash access over this transport".into()))
    }

    fn read_flash(&self, _offset: u32, _len: usize) -> Result<Vec<u8>> {
        Err(Error::Unsupported("flash access over this transport".into()))
    }
}

/// Hardware-generation specific behaviour.
///
/// A board holds no link of its own; every call receives the transport of the
/// device it belongs to. The required methods describe what differs between
/// generations, the provided ones encode the shared register protocol.
pub trait Board: Send {
    fn name(&self) -> &'static str;

    fn channel_count(&self, direction: Direction) -> usize;

    fn flash_geometry(&self) -> FlashGeometry;

    /// Accepted FPGA bitstream sizes in bytes
    fn fpga_sizes(&self) -> &'static [usize];

    /// Bring the board to its power-on defaults
    fn open(&mut self, transport: &dyn Transport) -> Result<()>;

    fn frequency_range(&self, channel: Channel) -> Range;

    fn band_for(&self, channel: Channel, frequency: u64) -> Band;

    /// RF port selected automatically for a band
    fn port_for_band(&self, channel: Channel, band: Band) -> &'static str;

    fn sample_rate_range(&self, channel: Channel) -> Range;

    /// Apply a sample rate and return the rate actually achieved
    fn set_sample_rate(&mut self, transport: &dyn Transport, channel: Channel, rate: u32)
        -> Result<u32>;

    fn get_sample_rate(&self, transport: &dyn Transport, channel: Channel) -> Result<u32>;

    fn bandwidth_range(&self, channel: Channel) -> Range;

    /// Apply an analog bandwidth and return the bandwidth actually selected
    fn set_bandwidth(&mut self, transport: &dyn Transport, channel: Channel, bandwidth: u32)
        -> Result<u32>;

    fn get_bandwidth(&self, transport: &dyn Transport, channel: Channel) -> Result<u32>;

    /// Gain stages in allocation order
    fn gain_stages(&self, channel: Channel) -> &'static [GainStage];

    fn gain_modes(&self, channel: Channel) -> &'static [GainMode];

    fn rf_ports(&self, channel: Channel) -> &'static [&'static str];

    fn loopback_modes(&self) -> &'static [Loopback];

    fn supports_fpga_tuning(&self) -> bool {
        true
    }

    /// Quiesce the hardware; called while the transport is still usable
    fn close(&mut self, transport: &dyn Transport) -> Result<()> {
        common::quiesce(transport)
    }

    fn set_frequency(&mut self, transport: &dyn Transport, channel: Channel, frequency: u64)
        -> Result<()> {
        self.frequency_range(channel).check("frequency", frequency as i64)?;
        let band = self.band_for(channel, frequency);
        let port = self.port_for_band(channel, band);
        common::tune(transport, channel, frequency)?;
        common::write_band(transport, channel, band)?;
        common::write_rf_port(transport, channel, self.rf_ports(channel), port)
    }

    fn get_frequency(&self, transport: &dyn Transport, channel: Channel) -> Result<u64> {
        common::read_frequency(transport, channel)
    }

    /// Switch band and RF port for an upcoming frequency without retuning
    fn select_band(&mut self, transport: &dyn Transport, channel: Channel, frequency: u64)
        -> Result<()> {
        self.frequency_range(channel).check("frequency", frequency as i64)?;
        let band = self.band_for(channel, frequency);
        let port = self.port_for_band(channel, band);
        common::write_band(transport, channel, band)?;
        common::write_rf_port(transport, channel, self.rf_ports(channel), port)
    }

    fn gain_range(&self, channel: Channel) -> Range {
        common::overall_gain_range(self.gain_stages(channel))
    }

    fn set_gain(&mut self, transport: &dyn Transport, channel: Channel, gain: i32) -> Result<()> {
        self.gain_range(channel).check("gain", gain as i64)?;
        common::distribute_gain(transport, channel, self.gain_stages(channel), gain)
    }

    fn get_gain(&self, transport: &dyn Transport, channel: Channel) -> Result<i32> {
        common::read_overall_gain(transport, channel, self.gain_stages(channel))
    }

    fn gain_stage_range(&self, channel: Channel, stage: &str) -> Result<Range> {
        common::find_stage(self.gain_stages(channel), stage).map(|(_, s)| s.range)
    }

    fn set_gain_stage(&mut self, transport: &dyn Transport, channel: Channel, stage: &str, gain: i32)
        -> Result<()> {
        let (index, stage) = common::find_stage(self.gain_stages(channel), stage)?;
        stage.range.check(stage.name, gain as i64)?;
        common::write_stage(transport, channel, index, gain)
    }

    fn get_gain_stage(&self, transport: &dyn Transport, channel: Channel, stage: &str)
        -> Result<i32> {
        let (index, _) = common::find_stage(self.gain_stages(channel), stage)?;
        common::read_stage(transport, channel, index)
    }

    fn set_gain_mode(&mut self, transport: &dyn Transport, channel: Channel, mode: GainMode)
        -> Result<()> {
        if !self.gain_modes(channel).contains(&mode) {
            return Err(Error::Unsupported(format!(
                "gain mode {:?} on {} {}",
                mode,
                self.name(),
                channel
            )));
        }
        common::write_gain_mode(transport, channel, mode)
    }

    fn get_gain_mode(&self, transport: &dyn Transport, channel: Channel) -> Result<GainMode> {
        if self.gain_modes(channel).is_empty() {
            return Err(Error::Unsupported(format!("gain modes on {}", channel)));
        }
        common::read_gain_mode(transport, channel)
    }

    fn set_rf_port(&mut self, transport: &dyn Transport, channel: Channel, port: &str)
        -> Result<()> {
        common::write_rf_port(transport, channel, self.rf_ports(channel), port)
    }

    fn get_rf_port(&self, transport: &dyn Transport, channel: Channel) -> Result<&'static str> {
        common::read_rf_port(transport, channel, self.rf_ports(channel))
    }

    fn is_loopback_supported(&self, mode: Loopback) -> bool {
        self.loopback_modes().contains(&mode)
    }

    fn set_loopback(&mut self, transport: &dyn Transport, mode: Loopback) -> Result<()> {
        if !self.is_loopback_supported(mode) {
            return Err(Error::Unsupported(format!("loopback {:?} on {}", mode, self.name())));
        }
        common::write_loopback(transport, mode)
    }

    fn get_loopback(&self, transport: &dyn Transport) -> Result<Loopback> {
        common::read_loopback(transport)
    }

    fn set_rx_mux(&mut self, transport: &dyn Transport, mux: RxMux) -> Result<()> {
        common::write_rx_mux(transport, mux)
    }

    fn get_rx_mux(&self, transport: &dyn Transport) -> Result<RxMux> {
        common::read_rx_mux(transport)
    }

    fn set_tuning_mode(&mut self, transport: &dyn Transport, mode: TuningMode) -> Result<()> {
        if mode == TuningMode::Fpga && !self.supports_fpga_tuning() {
            return Err(Error::Unsupported(format!("FPGA tuning on {}", self.name())));
        }
        common::write_tuning_mode(transport, mode)
    }

    fn get_tuning_mode(&self, transport: &dyn Transport) -> Result<TuningMode> {
        common::read_tuning_mode(transport)
    }

    fn set_correction(&mut self, transport: &dyn Transport, channel: Channel, corr: Correction, value: i16)
        -> Result<()> {
        corr.range().check("correction", value as i64)?;
        common::write_correction(transport, channel, corr, value)
    }

    fn get_correction(&self, transport: &dyn Transport, channel: Channel, corr: Correction)
        -> Result<i16> {
        common::read_correction(transport, channel, corr)
    }

    fn enable_module(&mut self, transport: &dyn Transport, channel: Channel, enable: bool)
        -> Result<()> {
        common::write_module_enable(transport, channel, enable)
    }

    /// Turn timestamped message framing on or off for a direction
    fn set_stream_framing(&mut self, transport: &dyn Transport, direction: Direction, enable: bool)
        -> Result<()> {
        common::write_framing(transport, direction, enable)
    }

    fn get_quick_tune(&self, transport: &dyn Transport, channel: Channel) -> Result<QuickTune> {
        common::read_quick_tune(transport, channel)
    }

    fn apply_quick_tune(&mut self, transport: &dyn Transport, channel: Channel, tune: &QuickTune)
        -> Result<()> {
        common::write_quick_tune(transport, channel, tune)?;
        let port = self.port_for_band(channel, tune.band);
        common::write_rf_port(transport, channel, self.rf_ports(channel), port)
    }

    fn trigger_init(&self, channel: Channel, signal: TriggerSignal) -> Result<Trigger> {
        if channel.index != 0 {
            return Err(Error::InvalidParameter(format!(
                "triggers are only routed to channel 0, not {}",
                channel
            )));
        }
        Ok(Trigger {
            channel,
            role: TriggerRole::Disabled,
            signal,
        })
    }

    fn trigger_arm(&mut self, transport: &dyn Transport, trigger: &Trigger, arm: bool)
        -> Result<()> {
        common::write_trigger_arm(transport, trigger, arm)
    }

    fn trigger_fire(&mut self, transport: &dyn Transport, trigger: &Trigger) -> Result<()> {
        common::write_trigger_fire(transport, trigger)
    }

    fn trigger_state(&self, transport: &dyn Transport, trigger: &Trigger) -> Result<TriggerState> {
        common::read_trigger_state(transport, trigger)
    }

    /// Apply a fractional sample rate. Boards without a fractional rate
    /// divider round to the nearest whole rate.
    fn set_rational_sample_rate(
        &mut self,
        transport: &dyn Transport,
        channel: Channel,
        rate: RationalRate,
    ) -> Result<RationalRate> {
        let rate = rate.normalize()?;
        let whole = u32::try_from(rate.round())
            .map_err(|_| Error::Range(format!("sample rate {} outside u32", rate)))?;
        let actual = self.set_sample_rate(transport, channel, whole)?;
        Ok(RationalRate::whole(u64::from(actual)))
    }

    fn get_rational_sample_rate(&self, transport: &dyn Transport, channel: Channel)
        -> Result<RationalRate> {
        let rate = self.get_sample_rate(transport, channel)?;
        Ok(RationalRate::whole(u64::from(rate)))
    }

    fn load_fpga(&mut self, transport: &dyn Transport, image: &[u8]) -> Result<()> {
        common::check_fpga_image(self.name(), self.fpga_sizes(), image)?;
        transport.load_fpga(image)
    }

    /// Store `image` in SPI flash for autoload at power-on
    fn flash_fpga(&mut self, transport: &dyn Transport, image: &[u8]) -> Result<()> {
        common::check_fpga_image(self.name(), self.fpga_sizes(), image)?;
        common::write_stored_fpga(transport, &self.flash_geometry(), image)
    }

    fn erase_stored_fpga(&mut self, transport: &dyn Transport) -> Result<()> {
        common::erase_stored_fpga(transport, &self.flash_geometry())
    }

    /// Size of the image stored for autoload, `None` when there is none
    fn stored_fpga_size(&self, transport: &dyn Transport) -> Result<Option<usize>> {
        common::read_stored_fpga_size(transport, &self.flash_geometry())
    }

    fn is_fpga_configured(&self, transport: &dyn Transport) -> Result<bool> {
        common::read_fpga_loaded(transport)
    }

    fn fw_version(&self, transport: &dyn Transport) -> Result<Version> {
        common::read_fw_version(transport)
    }

    fn fpga_version(&self, transport: &dyn Transport) -> Result<Version> {
        common::read_fpga_version(transport)
    }

    fn reset(&mut self, transport: &dyn Transport) -> Result<()> {
        common::write_reset(transport)
    }
}
