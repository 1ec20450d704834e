use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::metadata::{
    payload_offset, read_header, write_header, MessageHeader, MetaStatus, Metadata,
    HEADER_FLAG_BURST_END, HEADER_FLAG_BURST_START, MESSAGE_BYTES, SAMPLES_PER_MESSAGE,
};
use super::state::StreamState;
use super::worker::{Worker, WorkerMode};
use crate::buffers::{read_samples, write_samples, BufferPool, Endpoints, StreamConfig, BYTES_PER_SAMPLE};
use crate::error::{Error, Result};
use crate::hal::traits::Transport;
use crate::hal::types::Direction;
use crate::observability::diagnostics::STREAM_TARGET;
use crate::observability::{StreamMetrics, StreamStats};

/// Blocking sample stream for one direction of a device.
///
/// Callers move samples through fixed-size buffers shared with a transfer
/// worker. Two locks are involved: `calls` lets one application call at a
/// time work on the stream, and `inner` guards the stream state. `inner` is
/// only ever held briefly; a caller waiting for a buffer releases it, so the
/// command path can query, stop or reconfigure the stream meanwhile.
pub struct SyncStream {
    direction: Direction,
    calls: Mutex<()>,
    inner: Mutex<StreamInner>,
    /// Wakes a caller waiting for a buffer when the stream changes under it
    wake: (Sender<()>, Receiver<()>),
    metrics: Arc<StreamMetrics>,
}

struct StreamInner {
    direction: Direction,
    state: StreamState,
    config: Option<StreamConfig>,
    pool: Option<BufferPool>,
    caller: Option<Endpoints>,
    worker: Option<Worker>,
    transport: Option<Arc<dyn Transport>>,
    /// Buffer currently being read or written by the caller
    current: Option<Cursor>,
    /// Sticky transport failure
    fault: Option<Error>,
    /// Timestamp the next RX message should carry
    rx_expected: Option<u64>,
    burst: Option<Burst>,
    /// First timestamp after the most recent TX burst
    tx_next_timestamp: u64,
    /// Bumped whenever the stream starts, stops or is reconfigured
    epoch: u64,
    /// Bumped whenever `pool` is replaced
    pool_generation: u64,
}

struct Cursor {
    buffer: Vec<u8>,
    /// Payload samples already consumed or produced
    offset: usize,
}

struct Burst {
    start: u64,
    written: usize,
}

/// Per-call wait policy
enum Wait {
    NonBlocking,
    Until(Instant),
}

impl Wait {
    fn new(timeout_ms: u32) -> Self {
        if timeout_ms == 0 {
            Wait::NonBlocking
        } else {
            Wait::Until(Instant::now() + Duration::from_millis(timeout_ms as u64))
        }
    }

    fn recv(&self, queue: &Receiver<Vec<u8>>, wake: &Receiver<()>) -> Result<Vec<u8>> {
        let closed = || Error::Unexpected("stream buffer queue closed".into());
        match self {
            Wait::NonBlocking => queue.try_recv().map_err(|err| match err {
                TryRecvError::Empty => Error::WouldBlock("no stream buffer is ready".into()),
                TryRecvError::Disconnected => closed(),
            }),
            Wait::Until(deadline) => select! {
                recv(queue) -> buffer => buffer.map_err(|_| closed()),
                recv(wake) -> _ => Err(Error::InvalidState("stream changed while waiting".into())),
                default(deadline.saturating_duration_since(Instant::now())) => {
                    Err(Error::Timeout("no stream buffer became ready in time".into()))
                }
            },
        }
    }
}

impl Cursor {
    /// Header of the message holding the next payload sample, and the
    /// sample's slot within that message
    fn message(&self) -> Result<(MessageHeader, usize)> {
        let index = self.offset / SAMPLES_PER_MESSAGE;
        let start = index * MESSAGE_BYTES;
        let header = read_header(&self.buffer[start..start + MESSAGE_BYTES])
            .ok_or_else(|| Error::Unexpected(format!("stream message {} has no header", index)))?;
        Ok((header, self.offset % SAMPLES_PER_MESSAGE))
    }
}

impl SyncStream {
    pub fn new(direction: Direction, metrics: Arc<StreamMetrics>) -> Self {
        Self {
            direction,
            calls: Mutex::new(()),
            inner: Mutex::new(StreamInner {
                direction,
                state: StreamState::Unconfigured,
                config: None,
                pool: None,
                caller: None,
                worker: None,
                transport: None,
                current: None,
                fault: None,
                rx_expected: None,
                burst: None,
                tx_next_timestamp: 0,
                epoch: 0,
                pool_generation: 0,
            }),
            wake: bounded(1),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_calls(&self) -> MutexGuard<'_, ()> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Invalidate calls in progress and wake one that is waiting
    fn next_epoch(&self, inner: &mut StreamInner) {
        inner.epoch = inner.epoch.wrapping_add(1);
        let _ = self.wake.0.try_send(());
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    pub fn config(&self) -> Option<StreamConfig> {
        self.lock().config.clone()
    }

    pub fn metrics(&self) -> StreamStats {
        self.metrics.snapshot()
    }

    /// Buffers currently held by the pool, if configured
    pub fn available_buffers(&self) -> Option<usize> {
        self.lock().pool.as_ref().map(BufferPool::available)
    }

    /// Replace the stream configuration with a freshly allocated pool.
    ///
    /// Fails with `InvalidState` while the stream is enabled. On allocation
    /// failure the previous configuration stays in place.
    pub fn configure(&self, config: StreamConfig) -> Result<()> {
        let mut inner = self.lock();
        if !inner.state.can_transition_to(StreamState::Configured) {
            return Err(Error::InvalidState(format!(
                "cannot reconfigure the {} stream while it is {}",
                self.direction,
                inner.state.name()
            )));
        }
        if config.layout.direction() != self.direction {
            return Err(Error::InvalidParameter(format!(
                "layout {:?} does not belong to the {} stream",
                config.layout, self.direction
            )));
        }

        let pool = BufferPool::allocate(config.num_buffers, config.buffer_bytes(), config.num_transfers)?;

        log::debug!(
            target: STREAM_TARGET,
            "{} stream configured: {:?} {:?}, {} x {} samples, {} transfers",
            self.direction,
            config.layout,
            config.format,
            config.num_buffers,
            config.buffer_size,
            config.num_transfers
        );

        inner.caller = Some(pool.caller(self.direction));
        inner.pool = Some(pool);
        inner.pool_generation = inner.pool_generation.wrapping_add(1);
        inner.config = Some(config);
        inner.current = None;
        inner.fault = None;
        inner.rx_expected = None;
        inner.burst = None;
        inner.tx_next_timestamp = 0;
        inner.state = StreamState::Configured;
        self.next_epoch(&mut inner);
        Ok(())
    }

    /// Change the worker/drain timeout of the applied configuration.
    /// Takes effect the next time the stream is enabled.
    pub fn set_timeout(&self, timeout_ms: u32) -> Result<()> {
        if timeout_ms == 0 {
            return Err(Error::InvalidParameter("stream timeout must be non-zero".into()));
        }
        let mut inner = self.lock();
        let config = inner.config.as_mut().ok_or_else(|| {
            Error::InvalidState(format!("the {} stream is not configured", self.direction))
        })?;
        config.timeout_ms = timeout_ms;
        Ok(())
    }

    pub fn timeout(&self) -> Result<u32> {
        self.lock()
            .config
            .as_ref()
            .map(|config| config.timeout_ms)
            .ok_or_else(|| Error::InvalidState(format!("the {} stream is not configured", self.direction)))
    }

    /// Start the transfer worker. A no-op when already enabled.
    pub fn start(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let mut inner = self.lock();
        if inner.state == StreamState::Enabled {
            return Ok(());
        }
        if !inner.state.can_transition_to(StreamState::Enabled) {
            return Err(Error::InvalidState(format!(
                "the {} stream is {}",
                self.direction,
                inner.state.name()
            )));
        }

        let (pool, config) = match (inner.pool.as_ref(), inner.config.as_ref()) {
            (Some(pool), Some(config)) => (pool, config),
            _ => return Err(Error::InvalidState("stream has no buffer pool".into())),
        };
        pool.reset();
        let worker = Worker::spawn(
            self.direction,
            transport.clone(),
            pool.worker(self.direction),
            pool.budget(),
            config.timeout(),
            self.metrics.clone(),
        )?;

        inner.worker = Some(worker);
        inner.transport = Some(transport);
        inner.fault = None;
        inner.rx_expected = None;
        inner.burst = None;
        inner.state = StreamState::Enabled;
        self.next_epoch(&mut inner);
        Ok(())
    }

    /// Stop the worker, flushing pending TX samples first. A no-op unless
    /// enabled.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != StreamState::Enabled {
            return Ok(());
        }
        self.next_epoch(&mut inner);
        let result = inner.shutdown();
        inner.state = StreamState::Disabled;
        result
    }

    /// Stop if needed and release the configuration and its buffers
    pub fn teardown(&self) -> Result<()> {
        let mut inner = self.lock();
        self.next_epoch(&mut inner);
        let result = if inner.state == StreamState::Enabled {
            inner.shutdown()
        } else {
            Ok(())
        };
        inner.caller = None;
        inner.pool = None;
        inner.pool_generation = inner.pool_generation.wrapping_add(1);
        inner.config = None;
        inner.current = None;
        inner.state = StreamState::Unconfigured;
        result
    }

    /// Read `num_samples` samples into `samples` (interleaved I/Q, so
    /// `2 * num_samples` values).
    pub fn receive(
        &self,
        samples: &mut [i16],
        num_samples: usize,
        metadata: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<()> {
        let _call = self.lock_calls();
        let mut inner = self.lock();
        let config = inner.ready()?;
        check_len(samples.len(), num_samples)?;
        let wait = Wait::new(timeout_ms);

        match (config.format.has_metadata(), metadata) {
            (true, None) => Err(Error::InvalidParameter(
                "metadata format requires a Metadata argument".into(),
            )),
            (true, Some(meta)) => self.receive_framed(inner, &config, samples, num_samples, meta, &wait),
            (false, meta) => {
                self.receive_raw(inner, &config, samples, num_samples, &wait)?;
                if let Some(meta) = meta {
                    meta.status = MetaStatus::default();
                    meta.actual_count = num_samples;
                }
                Ok(())
            }
        }
    }

    /// Stage `num_samples` samples for transmission
    pub fn transmit(
        &self,
        samples: &[i16],
        num_samples: usize,
        metadata: Option<&mut Metadata>,
        timeout_ms: u32,
    ) -> Result<()> {
        let _call = self.lock_calls();
        let mut inner = self.lock();
        let config = inner.ready()?;
        check_len(samples.len(), num_samples)?;
        let wait = Wait::new(timeout_ms);

        match (config.format.has_metadata(), metadata) {
            (true, None) => Err(Error::InvalidParameter(
                "metadata format requires a Metadata argument".into(),
            )),
            (true, Some(meta)) => self.transmit_framed(inner, &config, samples, num_samples, meta, &wait),
            (false, meta) => {
                self.transmit_raw(inner, &config, samples, num_samples, &wait)?;
                if let Some(meta) = meta {
                    meta.actual_count = num_samples;
                }
                Ok(())
            }
        }
    }

    /// Hand a partially filled TX buffer to the hardware, zero-padded.
    /// Does not wait for it to be transmitted.
    pub fn flush(&self) -> Result<()> {
        let _call = self.lock_calls();
        let mut inner = self.lock();
        inner.ready()?;
        inner.flush_pending()
    }

    /// Make sure the caller holds a buffer. Waiting happens with the stream
    /// unlocked; a stream stopped or restarted meanwhile ends the call.
    fn acquire<'a>(
        &'a self,
        mut inner: MutexGuard<'a, StreamInner>,
        wait: &Wait,
    ) -> Result<MutexGuard<'a, StreamInner>> {
        if inner.current.is_some() {
            return Ok(inner);
        }
        let take = inner
            .caller
            .as_ref()
            .map(|caller| caller.take.clone())
            .ok_or_else(|| Error::InvalidState("stream has no buffer pool".into()))?;
        let epoch = inner.epoch;
        let generation = inner.pool_generation;

        let received = match wait {
            Wait::NonBlocking => wait.recv(&take, &self.wake.1),
            Wait::Until(_) => {
                // Wake-ups sent before this point belong to earlier epochs
                while self.wake.1.try_recv().is_ok() {}
                drop(inner);
                let received = wait.recv(&take, &self.wake.1);
                inner = self.lock();
                received
            }
        };

        if inner.epoch != epoch {
            if let (Ok(buffer), Some(pool)) = (received, inner.pool.as_ref()) {
                if inner.pool_generation == generation {
                    pool.reclaim(std::iter::once(buffer));
                }
            }
            return Err(Error::InvalidState(format!(
                "the {} stream was stopped during the call",
                self.direction
            )));
        }

        match received {
            Ok(buffer) => {
                inner.current = Some(Cursor { buffer, offset: 0 });
                Ok(inner)
            }
            Err(err) => {
                if let Some(fault) = inner.check_fault() {
                    return Err(fault);
                }
                if matches!(err, Error::Timeout(_)) {
                    self.metrics.record_timeout();
                    log::debug!(target: STREAM_TARGET, "{} stream timed out", self.direction);
                }
                Err(err)
            }
        }
    }

    fn receive_raw<'a>(
        &'a self,
        mut inner: MutexGuard<'a, StreamInner>,
        config: &StreamConfig,
        samples: &mut [i16],
        num_samples: usize,
        wait: &Wait,
    ) -> Result<()> {
        let capacity = config.samples_per_buffer();
        let mut copied = 0;

        while copied < num_samples {
            inner = self.acquire(inner, wait)?;
            let cursor = inner.cursor()?;
            let count = (capacity - cursor.offset).min(num_samples - copied);
            let start = cursor.offset * BYTES_PER_SAMPLE;
            read_samples(
                &cursor.buffer[start..start + count * BYTES_PER_SAMPLE],
                &mut samples[copied * 2..(copied + count) * 2],
            );
            cursor.offset += count;
            copied += count;
            if cursor.offset == capacity {
                inner.release()?;
            }
        }

        self.metrics.record_samples(copied);
        Ok(())
    }

    fn receive_framed<'a>(
        &'a self,
        mut inner: MutexGuard<'a, StreamInner>,
        config: &StreamConfig,
        samples: &mut [i16],
        num_samples: usize,
        meta: &mut Metadata,
        wait: &Wait,
    ) -> Result<()> {
        let channels = config.layout.num_channels();
        let capacity = config.samples_per_buffer();
        meta.status = MetaStatus::default();
        meta.actual_count = 0;

        if !meta.flags.rx_now {
            inner = self.seek(inner, meta.timestamp, channels, capacity, wait)?;
        }

        let mut copied = 0;
        let mut first: Option<u64> = None;

        while copied < num_samples {
            inner = self.acquire(inner, wait)?;
            let (header, slot) = inner.cursor()?.message()?;

            if slot == 0 && inner.rx_expected.is_some_and(|expected| expected != header.timestamp) {
                meta.status.overrun = true;
                self.metrics.record_overrun();
                log::warn!(
                    target: STREAM_TARGET,
                    "{} discontinuity: expected timestamp {:?}, got {}",
                    self.direction,
                    inner.rx_expected,
                    header.timestamp
                );
                inner.rx_expected = None;
                if copied > 0 {
                    break;
                }
            }

            first.get_or_insert(header.timestamp + (slot / channels) as u64);

            let count = (SAMPLES_PER_MESSAGE - slot).min(num_samples - copied);
            let cursor = inner.cursor()?;
            let start = payload_offset(cursor.offset);
            read_samples(
                &cursor.buffer[start..start + count * BYTES_PER_SAMPLE],
                &mut samples[copied * 2..(copied + count) * 2],
            );
            cursor.offset += count;
            copied += count;
            let exhausted = cursor.offset == capacity;

            inner.rx_expected = Some(header.timestamp + ((slot + count) / channels) as u64);
            if exhausted {
                inner.release()?;
            }
        }

        if let Some(timestamp) = first {
            meta.timestamp = timestamp;
        }
        meta.actual_count = copied;
        self.metrics.record_samples(copied);
        Ok(())
    }

    /// Discard samples until the next one carries `target`
    fn seek<'a>(
        &'a self,
        mut inner: MutexGuard<'a, StreamInner>,
        target: u64,
        channels: usize,
        capacity: usize,
        wait: &Wait,
    ) -> Result<MutexGuard<'a, StreamInner>> {
        loop {
            inner = self.acquire(inner, wait)?;
            let cursor = inner.cursor()?;
            let (header, slot) = cursor.message()?;
            let next = header.timestamp + (slot / channels) as u64;

            if next == target {
                break;
            }
            if next > target {
                return Err(Error::TimeInPast(format!(
                    "requested RX timestamp {} but the next sample is at {}",
                    target, next
                )));
            }

            let behind = ((target - next) as usize).saturating_mul(channels);
            cursor.offset += behind.min(SAMPLES_PER_MESSAGE - slot);
            if cursor.offset == capacity {
                inner.release()?;
            }
        }
        inner.rx_expected = None;
        Ok(inner)
    }

    fn transmit_raw<'a>(
        &'a self,
        mut inner: MutexGuard<'a, StreamInner>,
        config: &StreamConfig,
        samples: &[i16],
        num_samples: usize,
        wait: &Wait,
    ) -> Result<()> {
        let capacity = config.samples_per_buffer();
        let mut sent = 0;

        while sent < num_samples {
            inner = self.acquire(inner, wait)?;
            let cursor = inner.cursor()?;
            let count = (capacity - cursor.offset).min(num_samples - sent);
            let start = cursor.offset * BYTES_PER_SAMPLE;
            write_samples(
                &samples[sent * 2..(sent + count) * 2],
                &mut cursor.buffer[start..start + count * BYTES_PER_SAMPLE],
            );
            cursor.offset += count;
            sent += count;
            if cursor.offset == capacity {
                inner.release()?;
            }
        }

        self.metrics.record_samples(sent);
        Ok(())
    }

    fn transmit_framed<'a>(
        &'a self,
        mut inner: MutexGuard<'a, StreamInner>,
        config: &StreamConfig,
        samples: &[i16],
        num_samples: usize,
        meta: &mut Metadata,
        wait: &Wait,
    ) -> Result<()> {
        let channels = config.layout.num_channels();
        let capacity = config.samples_per_buffer();

        if meta.flags.tx_burst_start {
            if inner.burst.is_some() {
                inner.finish_burst(channels)?;
            }
            let transport = inner
                .transport
                .as_ref()
                .ok_or_else(|| Error::InvalidState("stream has no transport".into()))?;
            let next_free = transport
                .read_timestamp(Direction::Tx)?
                .max(inner.tx_next_timestamp);

            let start = if meta.flags.tx_now {
                next_free
            } else if meta.timestamp < next_free {
                return Err(Error::TimeInPast(format!(
                    "burst at {} but the next free TX timestamp is {}",
                    meta.timestamp, next_free
                )));
            } else {
                meta.timestamp
            };
            meta.timestamp = start;
            inner.burst = Some(Burst { start, written: 0 });
        } else if inner.burst.is_none() {
            return Err(Error::InvalidParameter(
                "no burst in progress; the first call must set tx_burst_start".into(),
            ));
        }

        let mut sent = 0;
        while sent < num_samples {
            // Full buffers are held until more samples arrive so that a burst
            // end can still be marked in them.
            if inner.current.as_ref().is_some_and(|cursor| cursor.offset == capacity) {
                inner.release()?;
            }
            inner = self.acquire(inner, wait)?;

            let state = &mut *inner;
            let (Some(cursor), Some(burst)) = (state.current.as_mut(), state.burst.as_mut()) else {
                return Err(Error::Unexpected("TX burst state missing".into()));
            };

            let slot = cursor.offset % SAMPLES_PER_MESSAGE;
            if slot == 0 {
                let start = (cursor.offset / SAMPLES_PER_MESSAGE) * MESSAGE_BYTES;
                let flags = if burst.written == 0 { HEADER_FLAG_BURST_START } else { 0 };
                write_header(
                    &mut cursor.buffer[start..start + MESSAGE_BYTES],
                    MessageHeader {
                        timestamp: burst.start + (burst.written / channels) as u64,
                        flags,
                    },
                );
            }

            let count = (SAMPLES_PER_MESSAGE - slot).min(num_samples - sent);
            let start = payload_offset(cursor.offset);
            write_samples(
                &samples[sent * 2..(sent + count) * 2],
                &mut cursor.buffer[start..start + count * BYTES_PER_SAMPLE],
            );
            cursor.offset += count;
            burst.written += count;
            sent += count;
        }

        meta.actual_count = sent;
        self.metrics.record_samples(sent);

        if meta.flags.tx_burst_end {
            inner.finish_burst(channels)?;
        }
        Ok(())
    }
}

fn check_len(len: usize, num_samples: usize) -> Result<()> {
    let needed = num_samples
        .checked_mul(2)
        .ok_or_else(|| Error::InvalidParameter(format!("{} samples is too many", num_samples)))?;
    if len < needed {
        return Err(Error::InvalidParameter(format!(
            "{} samples requested but the slice holds {}",
            num_samples,
            len / 2
        )));
    }
    Ok(())
}

impl StreamInner {
    /// Configuration of an enabled, healthy stream
    fn ready(&mut self) -> Result<StreamConfig> {
        if let Some(fault) = self.check_fault() {
            return Err(fault);
        }
        if self.state != StreamState::Enabled {
            return Err(Error::InvalidState(format!(
                "the {} stream is {}",
                self.direction,
                self.state.name()
            )));
        }
        self.config
            .clone()
            .ok_or_else(|| Error::InvalidState("stream has no configuration".into()))
    }

    fn check_fault(&mut self) -> Option<Error> {
        if self.fault.is_none() {
            self.fault = self.worker.as_ref().and_then(Worker::fault);
        }
        self.fault.clone()
    }

    fn cursor(&mut self) -> Result<&mut Cursor> {
        self.current
            .as_mut()
            .ok_or_else(|| Error::Unexpected("stream cursor missing".into()))
    }

    /// Pass the held buffer on to the other side of the pool
    fn release(&mut self) -> Result<()> {
        if let Some(cursor) = self.current.take() {
            let caller = self
                .caller
                .as_ref()
                .ok_or_else(|| Error::InvalidState("stream has no buffer pool".into()))?;
            caller
                .give
                .try_send(cursor.buffer)
                .map_err(|_| Error::Unexpected("stream buffer queue rejected a buffer".into()))?;
        }
        Ok(())
    }

    /// Mark the last message of the burst, zero the rest of its buffer and
    /// submit it
    fn finish_burst(&mut self, channels: usize) -> Result<()> {
        let Some(burst) = self.burst.take() else {
            return Ok(());
        };

        if let Some(cursor) = self.current.as_mut() {
            if cursor.offset > 0 {
                let last = (cursor.offset - 1) / SAMPLES_PER_MESSAGE;
                let start = last * MESSAGE_BYTES;
                if let Some(mut header) = read_header(&cursor.buffer[start..]) {
                    header.flags |= HEADER_FLAG_BURST_END;
                    write_header(&mut cursor.buffer[start..start + MESSAGE_BYTES], header);
                }
                let end = payload_offset(cursor.offset - 1) + BYTES_PER_SAMPLE;
                cursor.buffer[end..].fill(0);
                self.release()?;
            }
        }

        self.tx_next_timestamp = burst.start + burst.written.div_ceil(channels) as u64;
        log::trace!(
            target: STREAM_TARGET,
            "TX burst of {} samples at {} queued",
            burst.written,
            burst.start
        );
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.direction != Direction::Tx {
            return Ok(());
        }
        let (channels, framed) = match self.config.as_ref() {
            Some(config) => (config.layout.num_channels(), config.format.has_metadata()),
            None => return Ok(()),
        };

        if framed {
            return self.finish_burst(channels);
        }

        if let Some(cursor) = self.current.as_mut() {
            if cursor.offset > 0 {
                cursor.buffer[cursor.offset * BYTES_PER_SAMPLE..].fill(0);
                self.release()?;
            }
        }
        Ok(())
    }

    /// Stop the worker and take back every buffer
    fn shutdown(&mut self) -> Result<()> {
        let faulted = self.check_fault().is_some();
        let flushed = self.flush_pending();
        let mode = if self.direction == Direction::Tx && flushed.is_ok() {
            WorkerMode::Drain
        } else {
            WorkerMode::Stop
        };

        if let Some(mut worker) = self.worker.take() {
            worker.shutdown(mode);
        }

        if let Some(pool) = self.pool.as_ref() {
            if let Some(transport) = self.transport.as_ref() {
                pool.reclaim(transport.cancel_transfers(self.direction));
            }
            if let Some(cursor) = self.current.take() {
                pool.reclaim(std::iter::once(cursor.buffer));
            }
            pool.reset();
        }

        self.transport = None;
        self.burst = None;
        self.rx_expected = None;

        // A failed submission drops its buffer with it
        let refilled = match (faulted, self.config.as_ref()) {
            (true, Some(config)) => {
                BufferPool::allocate(config.num_buffers, config.buffer_bytes(), config.num_transfers)
                    .map(|pool| {
                        self.caller = Some(pool.caller(self.direction));
                        self.pool = Some(pool);
                        self.pool_generation = self.pool_generation.wrapping_add(1);
                    })
            }
            _ => Ok(()),
        };
        flushed.and(refilled)
    }
}
