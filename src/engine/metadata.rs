//! Per-call stream metadata and the timestamped message framing used on the
//! wire when a metadata format is configured.

use serde::{Deserialize, Serialize};

/// Size of one framed message
pub const MESSAGE_BYTES: usize = 2048;
/// Size of the message header
pub const HEADER_BYTES: usize = 16;
/// Payload samples per message
pub const SAMPLES_PER_MESSAGE: usize = (MESSAGE_BYTES - HEADER_BYTES) / 4;
/// Leading header word of every valid message
pub const MESSAGE_MAGIC: u32 = 0x1234_4321;

pub const HEADER_FLAG_BURST_START: u32 = 1 << 0;
pub const HEADER_FLAG_BURST_END: u32 = 1 << 1;

/// Request flags supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaFlags {
    pub tx_burst_start: bool,
    pub tx_burst_end: bool,
    /// Transmit at the next free timestamp instead of `timestamp`
    pub tx_now: bool,
    /// Receive from the next available sample instead of `timestamp`
    pub rx_now: bool,
}

/// Conditions reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaStatus {
    /// Samples were lost between the previous call and this one
    pub overrun: bool,
}

/// Metadata exchanged with each `sync_rx`/`sync_tx` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub timestamp: u64,
    pub flags: MetaFlags,
    pub status: MetaStatus,
    pub actual_count: usize,
}

impl Metadata {
    pub fn rx_now() -> Self {
        Self {
            flags: MetaFlags {
                rx_now: true,
                ..MetaFlags::default()
            },
            ..Self::default()
        }
    }

    pub fn rx_at(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// A complete burst starting at `timestamp`
    pub fn burst_at(timestamp: u64) -> Self {
        Self {
            timestamp,
            flags: MetaFlags {
                tx_burst_start: true,
                tx_burst_end: true,
                ..MetaFlags::default()
            },
            ..Self::default()
        }
    }
}

/// Decoded message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub timestamp: u64,
    pub flags: u32,
}

pub fn write_header(message: &mut [u8], header: MessageHeader) {
    message[0..4].copy_from_slice(&MESSAGE_MAGIC.to_le_bytes());
    message[4..12].copy_from_slice(&header.timestamp.to_le_bytes());
    message[12..16].copy_from_slice(&header.flags.to_le_bytes());
}

/// Header of `message`, or `None` when the magic word is missing
pub fn read_header(message: &[u8]) -> Option<MessageHeader> {
    if message.len() < HEADER_BYTES {
        return None;
    }
    let magic = u32::from_le_bytes([message[0], message[1], message[2], message[3]]);
    if magic != MESSAGE_MAGIC {
        return None;
    }
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&message[4..12]);
    Some(MessageHeader {
        timestamp: u64::from_le_bytes(timestamp),
        flags: u32::from_le_bytes([message[12], message[13], message[14], message[15]]),
    })
}

/// Byte offset of payload sample `sample` within a framed buffer
pub fn payload_offset(sample: usize) -> usize {
    let message = sample / SAMPLES_PER_MESSAGE;
    let slot = sample % SAMPLES_PER_MESSAGE;
    message * MESSAGE_BYTES + HEADER_BYTES + slot * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut message = vec![0u8; MESSAGE_BYTES];
        let header = MessageHeader {
            timestamp: 0x0102_0304_0506_0708,
            flags: HEADER_FLAG_BURST_START | HEADER_FLAG_BURST_END,
        };
        write_header(&mut message, header);
        assert_eq!(&message[0..4], &[0x21, 0x43, 0x34, 0x12]);
        assert_eq!(message[4], 0x08);
        assert_eq!(read_header(&message), Some(header));
    }

    #[test]
    fn test_missing_magic() {
        let message = vec![0u8; MESSAGE_BYTES];
        assert_eq!(read_header(&message), None);
        assert_eq!(read_header(&message[..4]), None);
    }

    #[test]
    fn test_payload_offsets() {
        assert_eq!(SAMPLES_PER_MESSAGE, 508);
        assert_eq!(payload_offset(0), HEADER_BYTES);
        assert_eq!(payload_offset(507), HEADER_BYTES + 507 * 4);
        assert_eq!(payload_offset(508), MESSAGE_BYTES + HEADER_BYTES);
    }
}
