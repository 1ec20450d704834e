use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => f.write_str("RX"),
            Direction::Tx => f.write_str("TX"),
        }
    }
}

/// A logical channel: direction plus index (RX0, TX1, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel {
    pub direction: Direction,
    pub index: u8,
}

impl Channel {
    pub const RX0: Channel = Channel::rx(0);
    pub const RX1: Channel = Channel::rx(1);
    pub const TX0: Channel = Channel::tx(0);
    pub const TX1: Channel = Channel::tx(1);

    pub const fn rx(index: u8) -> Self {
        Self { direction: Direction::Rx, index }
    }

    pub const fn tx(index: u8) -> Self {
        Self { direction: Direction::Tx, index }
    }

    /// Flat channel number: RX channels are even, TX channels odd.
    pub fn id(&self) -> u16 {
        let base = self.index as u16 * 2;
        match self.direction {
            Direction::Rx => base,
            Direction::Tx => base + 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.direction, self.index)
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let (direction, rest) = if let Some(rest) = lower.strip_prefix("rx") {
            (Direction::Rx, rest)
        } else if let Some(rest) = lower.strip_prefix("tx") {
            (Direction::Tx, rest)
        } else {
            return Err(Error::InvalidParameter(format!("unknown channel '{}'", s)));
        };

        let index = rest
            .parse::<u8>()
            .map_err(|_| Error::InvalidParameter(format!("unknown channel '{}'", s)))?;

        Ok(Self { direction, index })
    }
}

impl TryFrom<String> for Channel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.to_string()
    }
}

/// Assignment of one or more channels to a single synchronized stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    RxX1,
    TxX1,
    RxX2,
    TxX2,
    RxX4,
    TxX4,
}

impl ChannelLayout {
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::RxX1 | ChannelLayout::TxX1 => 1,
            ChannelLayout::RxX2 | ChannelLayout::TxX2 => 2,
            ChannelLayout::RxX4 | ChannelLayout::TxX4 => 4,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            ChannelLayout::RxX1 | ChannelLayout::RxX2 | ChannelLayout::RxX4 => Direction::Rx,
            ChannelLayout::TxX1 | ChannelLayout::TxX2 | ChannelLayout::TxX4 => Direction::Tx,
        }
    }

    /// Channels streamed together by this layout, in wire order.
    pub fn channels(&self) -> Vec<Channel> {
        let direction = self.direction();
        (0..self.num_channels() as u8)
            .map(|index| Channel { direction, index })
            .collect()
    }
}

/// Raw layout values follow the libbladeRF numbering (X4 appended).
impl TryFrom<u32> for ChannelLayout {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(ChannelLayout::RxX1),
            1 => Ok(ChannelLayout::TxX1),
            2 => Ok(ChannelLayout::RxX2),
            3 => Ok(ChannelLayout::TxX2),
            4 => Ok(ChannelLayout::RxX4),
            5 => Ok(ChannelLayout::TxX4),
            other => Err(Error::Unsupported(format!("channel layout {}", other))),
        }
    }
}

/// Wire sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Interleaved I/Q, signed 16-bit components, Q11 scaling
    Sc16Q11,
    /// SC16-Q11 payload carried in timestamped messages
    Sc16Q11Meta,
}

impl SampleFormat {
    /// Bytes per complex sample on the wire.
    pub fn bytes_per_sample(&self) -> usize {
        4
    }

    pub fn has_metadata(&self) -> bool {
        matches!(self, SampleFormat::Sc16Q11Meta)
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        SampleFormat::Sc16Q11
    }
}

/// Inclusive range with a step, as reported by a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

impl Range {
    pub const fn new(min: i64, max: i64, step: i64) -> Self {
        Self { min, max, step }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Fails with `Range` when `value` lies outside the range.
    pub fn check(&self, what: &str, value: i64) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(Error::Range(format!(
                "{} {} outside [{}, {}]",
                what, value, self.min, self.max
            )))
        }
    }
}

/// Sample rate of `integer + num / den` Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RationalRate {
    pub integer: u64,
    pub num: u64,
    pub den: u64,
}

impl RationalRate {
    pub const fn new(integer: u64, num: u64, den: u64) -> Self {
        Self { integer, num, den }
    }

    pub const fn whole(rate: u64) -> Self {
        Self { integer: rate, num: 0, den: 1 }
    }

    /// Carry whole hertz out of the fraction and reduce it to lowest terms.
    pub fn normalize(self) -> Result<Self> {
        if self.den == 0 {
            return Err(Error::InvalidParameter(format!(
                "sample rate {} {}/0 has a zero denominator",
                self.integer, self.num
            )));
        }
        let integer = self
            .integer
            .checked_add(self.num / self.den)
            .ok_or_else(|| Error::Range(format!("sample rate {} overflows", self.integer)))?;
        let num = self.num % self.den;
        let divisor = gcd(num, self.den);
        Ok(Self { integer, num: num / divisor, den: self.den / divisor })
    }

    /// Nearest whole rate, halves rounded up
    pub fn round(&self) -> u64 {
        if self.den == 0 {
            return self.integer;
        }
        let fraction = self.num % self.den;
        let carry = self.num / self.den + u64::from(fraction >= self.den - fraction);
        self.integer.saturating_add(carry)
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return self.integer as f64;
        }
        self.integer as f64 + self.num as f64 / self.den as f64
    }
}

impl fmt::Display for RationalRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.num == 0 {
            write!(f, "{} Hz", self.integer)
        } else {
            write!(f, "{} {}/{} Hz", self.integer, self.num, self.den)
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Gain control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GainMode {
    Default,
    Manual,
    FastAttack,
    SlowAttack,
    Hybrid,
}

impl GainMode {
    pub fn code(&self) -> u32 {
        match self {
            GainMode::Default => 0,
            GainMode::Manual => 1,
            GainMode::FastAttack => 2,
            GainMode::SlowAttack => 3,
            GainMode::Hybrid => 4,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(GainMode::Default),
            1 => Ok(GainMode::Manual),
            2 => Ok(GainMode::FastAttack),
            3 => Ok(GainMode::SlowAttack),
            4 => Ok(GainMode::Hybrid),
            other => Err(Error::Unexpected(format!("gain mode register value {}", other))),
        }
    }
}

/// A named gain stage and its range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainStage {
    pub name: &'static str,
    pub range: Range,
}

/// Loopback path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Loopback {
    None,
    Firmware,
    BbTxlpfRxvga2,
    BbTxvga1Rxvga2,
    BbTxlpfRxlpf,
    BbTxvga1Rxlpf,
    Lna1,
    Lna2,
    Lna3,
    RficBist,
}

impl Loopback {
    const ALL: [Loopback; 10] = [
        Loopback::None,
        Loopback::Firmware,
        Loopback::BbTxlpfRxvga2,
        Loopback::BbTxvga1Rxvga2,
        Loopback::BbTxlpfRxlpf,
        Loopback::BbTxvga1Rxlpf,
        Loopback::Lna1,
        Loopback::Lna2,
        Loopback::Lna3,
        Loopback::RficBist,
    ];

    pub fn code(&self) -> u32 {
        Self::ALL
            .iter()
            .position(|mode| mode == self)
            .map(|pos| pos as u32)
            .unwrap_or(0)
    }

    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::Unexpected(format!("loopback register value {}", code)))
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Loopback::None
    }
}

/// Source of the samples the FPGA places in the RX stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RxMux {
    Baseband,
    Counter12Bit,
    Counter32Bit,
    DigitalLoopback,
}

impl RxMux {
    pub fn code(&self) -> u32 {
        match self {
            RxMux::Baseband => 0,
            RxMux::Counter12Bit => 1,
            RxMux::Counter32Bit => 2,
            RxMux::DigitalLoopback => 4,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(RxMux::Baseband),
            1 => Ok(RxMux::Counter12Bit),
            2 => Ok(RxMux::Counter32Bit),
            4 => Ok(RxMux::DigitalLoopback),
            other => Err(Error::Unexpected(format!("rx mux register value {}", other))),
        }
    }
}

impl Default for RxMux {
    fn default() -> Self {
        RxMux::Baseband
    }
}

/// Where synthesizer tuning is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TuningMode {
    Host,
    Fpga,
}

/// IQ/DC correction parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Correction {
    DcOffsetI,
    DcOffsetQ,
    Phase,
    Gain,
}

impl Correction {
    pub fn index(&self) -> u16 {
        match self {
            Correction::DcOffsetI => 0,
            Correction::DcOffsetQ => 1,
            Correction::Phase => 2,
            Correction::Gain => 3,
        }
    }

    pub fn range(&self) -> Range {
        match self {
            Correction::DcOffsetI | Correction::DcOffsetQ => Range::new(-2048, 2047, 1),
            Correction::Phase | Correction::Gain => Range::new(-4096, 4096, 1),
        }
    }
}

/// RF band selected for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Low,
    High,
}

/// Precomputed synthesizer words for a near-instant retune
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickTune {
    pub nint: u32,
    pub nfrac: u32,
    pub band: Band,
}

/// Flash layout of the device's SPI flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashGeometry {
    pub size_bytes: u32,
    pub page_size: u32,
    pub erase_block_size: u32,
}

impl FlashGeometry {
    pub fn pages(&self) -> u32 {
        self.size_bytes / self.page_size
    }

    pub fn erase_blocks(&self) -> u32 {
        self.size_bytes / self.erase_block_size
    }
}

/// Firmware/FPGA version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// Packed register form: `major << 16 | minor << 8 | patch`.
    pub fn to_register(&self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32 & 0xff) << 8) | (self.patch as u32 & 0xff)
    }

    pub fn from_register(value: u32) -> Self {
        Self {
            major: (value >> 16) as u16,
            minor: ((value >> 8) & 0xff) as u16,
            patch: (value & 0xff) as u16,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
