use super::Device;
use crate::buffers::StreamConfig;
use crate::engine::metadata::Metadata;
use crate::engine::state::StreamState;
use crate::error::{Error, Result};
use crate::hal::types::{Channel, ChannelLayout, Direction, SampleFormat};
use crate::observability::StreamStats;

impl Device {
    /// Enable or disable the RF front end of one channel.
    ///
    /// Enabling starts the direction's stream if it is configured; disabling
    /// the last enabled channel of a direction stops its stream, flushing
    /// pending TX samples first.
    pub fn enable_module(&self, channel: Channel, enable: bool) -> Result<()> {
        let op = if enable { "enable_module" } else { "disable_module" };
        self.command(op, |s| {
            s.check_channel(channel)?;
            let stream = self.stream(channel.direction);

            if enable {
                s.board.enable_module(s.transport, channel, true)?;
                s.enabled.insert(channel);
                if matches!(stream.state(), StreamState::Configured | StreamState::Disabled) {
                    stream.start(self.transport.clone())?;
                }
                return Ok(());
            }

            s.enabled.remove(&channel);
            let stopped = if s.direction_enabled(channel.direction) {
                Ok(())
            } else {
                stream.stop()
            };
            s.board.enable_module(s.transport, channel, false)?;
            stopped
        })
    }

    /// Configure the synchronous stream of `layout`'s direction.
    ///
    /// `buffer_size` is in samples and must be a multiple of 1024;
    /// `timeout_ms` bounds worker waits and the TX drain on disable.
    pub fn sync_config(
        &self,
        layout: ChannelLayout,
        format: SampleFormat,
        num_buffers: usize,
        buffer_size: usize,
        num_transfers: usize,
        timeout_ms: u32,
    ) -> Result<()> {
        let config = StreamConfig {
            layout,
            format,
            num_buffers,
            buffer_size,
            num_transfers,
            timeout_ms,
        };
        self.apply_stream_config(config)
    }

    pub fn apply_stream_config(&self, config: StreamConfig) -> Result<()> {
        self.command("sync_config", |s| {
            config.validate()?;
            let direction = config.layout.direction();
            let available = s.board.channel_count(direction);
            if config.layout.num_channels() > available {
                return Err(Error::Unsupported(format!(
                    "{:?} on {} with {} {} channels",
                    config.layout,
                    s.board.name(),
                    available,
                    direction
                )));
            }

            let stream = self.stream(direction);
            if !stream.state().can_transition_to(StreamState::Configured) {
                return Err(Error::InvalidState(format!(
                    "cannot reconfigure the {} stream while it is {}",
                    direction,
                    stream.state().name()
                )));
            }

            // The gateware must frame before the engine expects headers
            let framed = config.format.has_metadata();
            let previous = stream.config().map_or(false, |c| c.format.has_metadata());
            s.board.set_stream_framing(s.transport, direction, framed)?;
            if let Err(err) = stream.configure(config) {
                if previous != framed {
                    if let Err(restore) = s.board.set_stream_framing(s.transport, direction, previous) {
                        log::warn!("could not restore {} framing: {}", direction, restore);
                    }
                }
                return Err(err);
            }

            if s.direction_enabled(direction) {
                stream.start(self.transport.clone())?;
            }
            Ok(())
        })
    }

    /// Receive `num_samples` samples. `samples` holds interleaved I/Q
    /// components, so it needs at least `2 * num_samples` entries.
    pub fn sync_rx(
        &self,
        samples: &mut [i16],
        num_samples: usize,
        metadata: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<()> {
        self.rx.receive(samples, num_samples, metadata, timeout_ms)
    }

    /// Transmit `num_samples` samples from interleaved I/Q `samples`
    pub fn sync_tx(
        &self,
        samples: &[i16],
        num_samples: usize,
        metadata: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<()> {
        self.tx.transmit(samples, num_samples, metadata, timeout_ms)
    }

    /// Submit buffered TX samples without waiting for a full buffer
    pub fn sync_tx_flush(&self) -> Result<()> {
        self.tx.flush()
    }

    pub fn stream_state(&self, direction: Direction) -> StreamState {
        self.stream(direction).state()
    }

    pub fn stream_config(&self, direction: Direction) -> Option<StreamConfig> {
        self.stream(direction).config()
    }

    pub fn stream_metrics(&self, direction: Direction) -> StreamStats {
        self.stream(direction).metrics()
    }

    pub fn set_stream_timeout(&self, direction: Direction, timeout_ms: u32) -> Result<()> {
        self.command("set_stream_timeout", |_| self.stream(direction).set_timeout(timeout_ms))
    }

    pub fn get_stream_timeout(&self, direction: Direction) -> Result<u32> {
        self.command("get_stream_timeout", |_| self.stream(direction).timeout())
    }
}
