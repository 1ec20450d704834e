use super::{common, regs};
use crate::error::{Error, Result};
use crate::hal::devinfo::UsbIds;
use crate::hal::traits::{Board, Transport};
use crate::hal::types::{
    Band, Channel, Direction, FlashGeometry, GainMode, GainStage, Loopback, Range,
};

pub const NAME: &str = "bladerf1";

pub const FLASH_SIZE: u32 = 4 * 1024 * 1024;

pub const USB_IDS: &[UsbIds] = &[
    UsbIds { vendor: 0x2cf0, product: 0x5246 },
    // Legacy Nuand/OpenMoko id
    UsbIds { vendor: 0x1d50, product: 0x6066 },
];

/// Low-pass filter settings of the LMS6002D, ascending
const LPF_BANDWIDTHS: [u32; 16] = [
    1_500_000, 1_750_000, 2_500_000, 2_750_000, 3_000_000, 3_840_000, 5_000_000, 5_500_000,
    6_000_000, 7_000_000, 8_750_000, 10_000_000, 12_000_000, 14_000_000, 20_000_000, 28_000_000,
];

const FREQUENCY_RANGE: Range = Range::new(237_500_000, 3_800_000_000, 1);
const SAMPLE_RATE_RANGE: Range = Range::new(160_000, 40_000_000, 1);
const BANDWIDTH_RANGE: Range = Range::new(1_500_000, 28_000_000, 1);
const BAND_SPLIT_HZ: u64 = 1_500_000_000;

// The unit-step stage goes last so any remainder lands exactly.
const RX_STAGES: &[GainStage] = &[
    GainStage { name: "lna", range: Range::new(0, 6, 3) },
    GainStage { name: "rxvga2", range: Range::new(0, 30, 3) },
    GainStage { name: "rxvga1", range: Range::new(5, 30, 1) },
];

const TX_STAGES: &[GainStage] = &[
    GainStage { name: "txvga2", range: Range::new(0, 25, 1) },
    GainStage { name: "txvga1", range: Range::new(-35, -4, 1) },
];

const RX_PORTS: &[&str] = &["lna1", "lna2", "lna3"];
const TX_PORTS: &[&str] = &["pa1", "pa2"];

const RX_GAIN_MODES: &[GainMode] = &[GainMode::Default, GainMode::Manual];

const LOOPBACK_MODES: &[Loopback] = &[
    Loopback::None,
    Loopback::Firmware,
    Loopback::BbTxlpfRxvga2,
    Loopback::BbTxvga1Rxvga2,
    Loopback::BbTxlpfRxlpf,
    Loopback::BbTxvga1Rxlpf,
    Loopback::Lna1,
    Loopback::Lna2,
    Loopback::Lna3,
];

const FPGA_SIZES: &[usize] = &[1_191_788, 3_243_292];

const DEFAULT_FREQUENCY: u64 = 2_400_000_000;
const DEFAULT_SAMPLE_RATE: u32 = 1_000_000;
const DEFAULT_BANDWIDTH: u32 = 1_500_000;

/// First generation: LMS6002D transceiver, one RX and one TX channel
#[derive(Debug, Default)]
pub struct Bladerf1;

impl Bladerf1 {
    pub fn new() -> Self {
        Self
    }

    fn check_channel(channel: Channel) -> Result<()> {
        if channel.index != 0 {
            return Err(Error::InvalidParameter(format!("{} has no channel {}", NAME, channel)));
        }
        Ok(())
    }
}

impl Board for Bladerf1 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn channel_count(&self, _direction: Direction) -> usize {
        1
    }

    fn flash_geometry(&self) -> FlashGeometry {
        FlashGeometry {
            size_bytes: FLASH_SIZE,
            page_size: regs::FLASH_PAGE,
            erase_block_size: regs::FLASH_ERASE_BLOCK,
        }
    }

    fn fpga_sizes(&self) -> &'static [usize] {
        FPGA_SIZES
    }

    fn open(&mut self, transport: &dyn Transport) -> Result<()> {
        if !common::read_fpga_loaded(transport)? {
            log::warn!(target: "sdrcore::command", "{}: FPGA is not configured", NAME);
        }
        common::quiesce(transport)?;
        common::write_loopback(transport, Loopback::None)?;
        common::write_rx_mux(transport, Default::default())?;

        for channel in [Channel::RX0, Channel::TX0] {
            self.set_frequency(transport, channel, DEFAULT_FREQUENCY)?;
            self.set_sample_rate(transport, channel, DEFAULT_SAMPLE_RATE)?;
            self.set_bandwidth(transport, channel, DEFAULT_BANDWIDTH)?;
            let gain = self.gain_range(channel).min as i32;
            self.set_gain(transport, channel, gain)?;
        }
        common::write_gain_mode(transport, Channel::RX0, GainMode::Default)
    }

    fn frequency_range(&self, _channel: Channel) -> Range {
        FREQUENCY_RANGE
    }

    fn band_for(&self, _channel: Channel, frequency: u64) -> Band {
        if frequency < BAND_SPLIT_HZ {
            Band::Low
        } else {
            Band::High
        }
    }

    fn port_for_band(&self, channel: Channel, band: Band) -> &'static str {
        match (channel.direction, band) {
            (Direction::Rx, Band::Low) => "lna1",
            (Direction::Rx, Band::High) => "lna2",
            (Direction::Tx, Band::Low) => "pa1",
            (Direction::Tx, Band::High) => "pa2",
        }
    }

    fn sample_rate_range(&self, _channel: Channel) -> Range {
        SAMPLE_RATE_RANGE
    }

    fn set_sample_rate(&mut self, transport: &dyn Transport, channel: Channel, rate: u32)
        -> Result<u32> {
        Self::check_channel(channel)?;
        SAMPLE_RATE_RANGE.check("sample rate", rate as i64)?;
        transport.write_register(regs::channel(channel, regs::SAMPLE_RATE), rate)?;
        self.get_sample_rate(transport, channel)
    }

    fn get_sample_rate(&self, transport: &dyn Transport, channel: Channel) -> Result<u32> {
        transport.read_register(regs::channel(channel, regs::SAMPLE_RATE))
    }

    fn bandwidth_range(&self, _channel: Channel) -> Range {
        BANDWIDTH_RANGE
    }

    fn set_bandwidth(&mut self, transport: &dyn Transport, channel: Channel, bandwidth: u32)
        -> Result<u32> {
        Self::check_channel(channel)?;
        BANDWIDTH_RANGE.check("bandwidth", bandwidth as i64)?;
        let index = LPF_BANDWIDTHS
            .iter()
            .position(|&lpf| lpf >= bandwidth)
            .unwrap_or(LPF_BANDWIDTHS.len() - 1);
        transport.write_register(regs::channel(channel, regs::BANDWIDTH), index as u32)?;
        Ok(LPF_BANDWIDTHS[index])
    }

    fn get_bandwidth(&self, transport: &dyn Transport, channel: Channel) -> Result<u32> {
        let index = transport.read_register(regs::channel(channel, regs::BANDWIDTH))?;
        LPF_BANDWIDTHS
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::Unexpected(format!("LPF register value {}", index)))
    }

    fn gain_stages(&self, channel: Channel) -> &'static [GainStage] {
        match channel.direction {
            Direction::Rx => RX_STAGES,
            Direction::Tx => TX_STAGES,
        }
    }

    fn gain_modes(&self, channel: Channel) -> &'static [GainMode] {
        match channel.direction {
            Direction::Rx => RX_GAIN_MODES,
            Direction::Tx => &[],
        }
    }

    fn rf_ports(&self, channel: Channel) -> &'static [&'static str] {
        match channel.direction {
            Direction::Rx => RX_PORTS,
            Direction::Tx => TX_PORTS,
        }
    }

    fn loopback_modes(&self) -> &'static [Loopback] {
        LOOPBACK_MODES
    }
}
