use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::BYTES_PER_SAMPLE;
use crate::engine::metadata::{MESSAGE_BYTES, SAMPLES_PER_MESSAGE};
use crate::error::{Error, Result};
use crate::hal::types::{ChannelLayout, SampleFormat};

/// Buffer sizes must be a whole number of this many samples
pub const BUFFER_SIZE_MULTIPLE: usize = 1024;

pub const DEFAULT_NUM_BUFFERS: usize = 16;
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_NUM_TRANSFERS: usize = 8;
pub const DEFAULT_TIMEOUT_MS: u32 = 3500;

/// Parameters of one direction's synchronous stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub layout: ChannelLayout,
    pub format: SampleFormat,
    pub num_buffers: usize,
    /// Samples per buffer, counted across all channels of the layout
    pub buffer_size: usize,
    pub num_transfers: usize,
    /// Worker and drain timeout
    pub timeout_ms: u32,
}

impl StreamConfig {
    pub fn new(layout: ChannelLayout) -> Self {
        Self {
            layout,
            format: SampleFormat::Sc16Q11,
            num_buffers: DEFAULT_NUM_BUFFERS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            num_transfers: DEFAULT_NUM_TRANSFERS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_buffers(mut self, num_buffers: usize, buffer_size: usize) -> Self {
        self.num_buffers = num_buffers;
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_transfers(mut self, num_transfers: usize) -> Self {
        self.num_transfers = num_transfers;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Check every parameter before anything is allocated
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 || self.buffer_size % BUFFER_SIZE_MULTIPLE != 0 {
            return Err(Error::InvalidParameter(format!(
                "buffer size {} is not a positive multiple of {}",
                self.buffer_size, BUFFER_SIZE_MULTIPLE
            )));
        }
        if self.num_buffers == 0 {
            return Err(Error::InvalidParameter("at least one buffer is required".into()));
        }
        if self.num_transfers == 0 || self.num_transfers > self.num_buffers {
            return Err(Error::InvalidParameter(format!(
                "{} transfers cannot be served by {} buffers",
                self.num_transfers, self.num_buffers
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidParameter("stream timeout must be non-zero".into()));
        }
        if self.buffer_size % self.layout.num_channels() != 0 {
            return Err(Error::InvalidParameter(format!(
                "buffer size {} does not divide across {} channels",
                self.buffer_size,
                self.layout.num_channels()
            )));
        }
        Ok(())
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_size * BYTES_PER_SAMPLE
    }

    pub fn messages_per_buffer(&self) -> usize {
        self.buffer_bytes() / MESSAGE_BYTES
    }

    /// Payload samples a caller can move through one buffer
    pub fn samples_per_buffer(&self) -> usize {
        if self.format.has_metadata() {
            self.messages_per_buffer() * SAMPLES_PER_MESSAGE
        } else {
            self.buffer_size
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamConfig::new(ChannelLayout::RxX2);
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_bytes(), 4096 * 4);
    }

    #[test]
    fn test_rejects_bad_buffer_size() {
        for size in [0, 1000, 1536] {
            let config = StreamConfig::new(ChannelLayout::RxX1).with_buffers(4, size);
            assert!(matches!(config.validate(), Err(Error::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_rejects_transfer_overcommit() {
        let config = StreamConfig::new(ChannelLayout::TxX1)
            .with_buffers(4, 1024)
            .with_transfers(5);
        assert!(matches!(config.validate(), Err(Error::InvalidParameter(_))));

        let config = config.with_transfers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metadata_payload_size() {
        let config = StreamConfig::new(ChannelLayout::RxX1)
            .with_format(SampleFormat::Sc16Q11Meta)
            .with_buffers(4, 2048);
        assert_eq!(config.messages_per_buffer(), 4);
        assert_eq!(config.samples_per_buffer(), 4 * 508);
    }
}
