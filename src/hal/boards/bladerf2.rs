use super::{common, regs};
use crate::error::{Error, Result};
use crate::hal::devinfo::UsbIds;
use crate::hal::traits::{Board, Transport};
use crate::hal::types::{
    Band, Channel, Direction, FlashGeometry, GainMode, GainStage, Loopback, Range, RationalRate,
};

pub const NAME: &str = "bladerf2";

pub const FLASH_SIZE: u32 = 16 * 1024 * 1024;

pub const USB_IDS: &[UsbIds] = &[UsbIds { vendor: 0x2cf0, product: 0x5250 }];

const RX_FREQUENCY_RANGE: Range = Range::new(70_000_000, 6_000_000_000, 1);
const TX_FREQUENCY_RANGE: Range = Range::new(47_000_000, 6_000_000_000, 1);
const SAMPLE_RATE_RANGE: Range = Range::new(520_834, 61_440_000, 1);
const BANDWIDTH_RANGE: Range = Range::new(200_000, 56_000_000, 1_000);
const BAND_SPLIT_HZ: u64 = 3_000_000_000;

/// Fractional bits of the sample clock divider word
const RATE_FRAC_BITS: u32 = 20;

const RX_STAGES: &[GainStage] = &[GainStage { name: "full", range: Range::new(-15, 60, 1) }];
const TX_STAGES: &[GainStage] = &[GainStage { name: "dsa", range: Range::new(-89, 0, 1) }];

const RX_PORTS: &[&str] = &["A_BALANCED", "B_BALANCED", "C_BALANCED"];
const TX_PORTS: &[&str] = &["TXA", "TXB"];

const RX_GAIN_MODES: &[GainMode] = &[
    GainMode::Default,
    GainMode::Manual,
    GainMode::FastAttack,
    GainMode::SlowAttack,
    GainMode::Hybrid,
];

const LOOPBACK_MODES: &[Loopback] = &[Loopback::None, Loopback::Firmware, Loopback::RficBist];

const FPGA_SIZES: &[usize] = &[2_632_660, 12_858_972];

const DEFAULT_FREQUENCY: u64 = 2_400_000_000;
const DEFAULT_SAMPLE_RATE: u32 = 30_720_000;
const DEFAULT_BANDWIDTH: u32 = 18_000_000;

const CHANNELS: [Channel; 4] = [Channel::RX0, Channel::RX1, Channel::TX0, Channel::TX1];

/// Second generation: AD9361 transceiver, two RX and two TX channels
#[derive(Debug, Default)]
pub struct Bladerf2;

impl Bladerf2 {
    pub fn new() -> Self {
        Self
    }

    fn rate_word(rate: u32) -> u32 {
        let reference = regs::REF_HZ;
        ((((rate as u64) << RATE_FRAC_BITS) + reference / 2) / reference) as u32
    }

    fn rate_from_word(word: u32) -> u32 {
        let half = 1u64 << (RATE_FRAC_BITS - 1);
        ((word as u64 * regs::REF_HZ + half) >> RATE_FRAC_BITS) as u32
    }

    /// Rate word for a fractional rate, rounded to the nearest step
    fn rational_rate_word(rate: RationalRate) -> u32 {
        let scaled = (rate.integer as u128 * rate.den as u128 + rate.num as u128) << RATE_FRAC_BITS;
        let divisor = rate.den as u128 * regs::REF_HZ as u128;
        ((scaled + divisor / 2) / divisor) as u32
    }

    /// Exact rate produced by a rate word
    fn rational_from_word(word: u32) -> RationalRate {
        let scaled = word as u64 * regs::REF_HZ;
        let den = 1u64 << RATE_FRAC_BITS;
        let rate = RationalRate::new(scaled >> RATE_FRAC_BITS, scaled & (den - 1), den);
        rate.normalize().unwrap_or(rate)
    }

    fn check_channel(channel: Channel) -> Result<()> {
        if channel.index > 1 {
            return Err(Error::InvalidParameter(format!("{} has no channel {}", NAME, channel)));
        }
        Ok(())
    }
}

impl Board for Bladerf2 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn channel_count(&self, _direction: Direction) -> usize {
        2
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

    fn supports_fpga_tuning(&self) -> bool {
        false
    }

    fn open(&mut self, transport: &dyn Transport) -> Result<()> {
        if !common::read_fpga_loaded(transport)? {
            return Err(Error::InvalidState(format!(
                "{} requires a configured FPGA before open",
                NAME
            )));
        }
        common::quiesce(transport)?;
        common::write_loopback(transport, Loopback::None)?;
        common::write_rx_mux(transport, Default::default())?;

        for channel in CHANNELS {
            self.set_frequency(transport, channel, DEFAULT_FREQUENCY)?;
            self.set_sample_rate(transport, channel, DEFAULT_SAMPLE_RATE)?;
            self.set_bandwidth(transport, channel, DEFAULT_BANDWIDTH)?;
            if channel.direction == Direction::Rx {
                common::write_gain_mode(transport, channel, GainMode::Default)?;
            }
            self.set_gain(transport, channel, 0)?;
        }
        Ok(())
    }

    fn frequency_range(&self, channel: Channel) -> Range {
        match channel.direction {
            Direction::Rx => RX_FREQUENCY_RANGE,
            Direction::Tx => TX_FREQUENCY_RANGE,
        }
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
            (Direction::Rx, Band::Low) => "B_BALANCED",
            (Direction::Rx, Band::High) => "A_BALANCED",
            (Direction::Tx, Band::Low) => "TXB",
            (Direction::Tx, Band::High) => "TXA",
        }
    }

    fn sample_rate_range(&self, _channel: Channel) -> Range {
        SAMPLE_RATE_RANGE
    }

    fn set_sample_rate(&mut self, transport: &dyn Transport, channel: Channel, rate: u32)
        -> Result<u32> {
        Self::check_channel(channel)?;
        SAMPLE_RATE_RANGE.check("sample rate", rate as i64)?;
        let word = Self::rate_word(rate);
        transport.write_register(regs::channel(channel, regs::SAMPLE_RATE), word)?;
        Ok(Self::rate_from_word(word))
    }

    fn get_sample_rate(&self, transport: &dyn Transport, channel: Channel) -> Result<u32> {
        let word = transport.read_register(regs::channel(channel, regs::SAMPLE_RATE))?;
        Ok(Self::rate_from_word(word))
    }

    fn set_rational_sample_rate(
        &mut self,
        transport: &dyn Transport,
        channel: Channel,
        rate: RationalRate,
    ) -> Result<RationalRate> {
        Self::check_channel(channel)?;
        let rate = rate.normalize()?;
        let min = SAMPLE_RATE_RANGE.min as u64;
        let max = SAMPLE_RATE_RANGE.max as u64;
        if rate.integer < min || rate.integer > max || (rate.integer == max && rate.num > 0) {
            return Err(Error::Range(format!(
                "sample rate {} outside [{}, {}]",
                rate, min, max
            )));
        }
        let word = Self::rational_rate_word(rate);
        transport.write_register(regs::channel(channel, regs::SAMPLE_RATE), word)?;
        Ok(Self::rational_from_word(word))
    }

    fn get_rational_sample_rate(&self, transport: &dyn Transport, channel: Channel)
        -> Result<RationalRate> {
        let word = transport.read_register(regs::channel(channel, regs::SAMPLE_RATE))?;
        Ok(Self::rational_from_word(word))
    }

    fn bandwidth_range(&self, _channel: Channel) -> Range {
        BANDWIDTH_RANGE
    }

    fn set_bandwidth(&mut self, transport: &dyn Transport, channel: Channel, bandwidth: u32)
        -> Result<u32> {
        Self::check_channel(channel)?;
        BANDWIDTH_RANGE.check("bandwidth", bandwidth as i64)?;
        let khz = bandwidth.div_ceil(1_000);
        transport.write_register(regs::channel(channel, regs::BANDWIDTH), khz)?;
        Ok(khz * 1_000)
    }

    fn get_bandwidth(&self, transport: &dyn Transport, channel: Channel) -> Result<u32> {
        Ok(transport.read_register(regs::channel(channel, regs::BANDWIDTH))? * 1_000)
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
