//! FPGA register map shared by both board generations.

use crate::hal::types::{Channel, Direction};

/// One enable bit per flat channel id
pub const MODULE_ENABLE: u16 = 0x0001;
/// Bit 0 RX message framing, bit 1 TX message framing
pub const TIMESTAMP_CTRL: u16 = 0x0002;
pub const LOOPBACK: u16 = 0x0003;
pub const RX_MUX: u16 = 0x0004;
pub const TUNING_MODE: u16 = 0x0005;
pub const FPGA_VERSION: u16 = 0x0008;
pub const FW_VERSION: u16 = 0x0009;
pub const FPGA_LOADED: u16 = 0x000A;
pub const RESET: u16 = 0x000B;
pub const TRIGGER_RX: u16 = 0x0010;
pub const TRIGGER_TX: u16 = 0x0011;

pub const TRIGGER_ARM: u32 = 1 << 0;
pub const TRIGGER_FIRE: u32 = 1 << 1;
pub const TRIGGER_MASTER: u32 = 1 << 2;
/// Set by the hardware once the shared trigger line has been asserted
pub const TRIGGER_LINE: u32 = 1 << 3;
pub const TRIGGER_SIGNAL_SHIFT: u32 = 8;

const CHANNEL_BASE: u16 = 0x0100;
const CHANNEL_STRIDE: u16 = 0x20;

// Offsets inside a channel block
pub const NINT: u16 = 0x00;
pub const NFRAC: u16 = 0x01;
pub const BAND: u16 = 0x02;
pub const SAMPLE_RATE: u16 = 0x03;
pub const BANDWIDTH: u16 = 0x04;
pub const GAIN_MODE: u16 = 0x06;
pub const RF_PORT: u16 = 0x07;
pub const CORRECTION: u16 = 0x08;
pub const GAIN_STAGE: u16 = 0x10;

/// SPI flash programming unit
pub const FLASH_PAGE: u32 = 256;
pub const FLASH_ERASE_BLOCK: u32 = 64 * 1024;
/// Stored FPGA region: one header page, then the bitstream
pub const FLASH_FPGA_OFFSET: u32 = 0x0004_0000;
pub const FLASH_FPGA_MAGIC: &[u8; 4] = b"FPGA";

/// Synthesizer reference clock
pub const REF_HZ: u64 = 38_400_000;
pub const FRAC_BITS: u32 = 23;

pub fn channel(channel: Channel, offset: u16) -> u16 {
    CHANNEL_BASE + channel.id() * CHANNEL_STRIDE + offset
}

pub fn trigger(direction: Direction) -> u16 {
    match direction {
        Direction::Rx => TRIGGER_RX,
        Direction::Tx => TRIGGER_TX,
    }
}

pub fn framing_bit(direction: Direction) -> u32 {
    match direction {
        Direction::Rx => 1 << 0,
        Direction::Tx => 1 << 1,
    }
}

pub fn enable_bit(channel: Channel) -> u32 {
    1 << channel.id()
}

/// Mask of every enable bit belonging to `direction`
pub fn direction_mask(direction: Direction) -> u32 {
    (0..8u8)
        .map(|index| enable_bit(Channel { direction, index }))
        .fold(0, |mask, bit| mask | bit)
}
