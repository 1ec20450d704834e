use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffers::{Endpoints, TransferBudget};
use crate::error::{Error, Result};
use crate::hal::traits::Transport;
use crate::hal::types::Direction;
use crate::observability::diagnostics::STREAM_TARGET;
use crate::observability::StreamMetrics;

/// How long the worker waits on the transport or the queue before
/// re-checking its mode
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerMode {
    Run = 0,
    /// Finish submitting queued buffers, then exit
    Drain = 1,
    Stop = 2,
}

impl WorkerMode {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerMode::Run,
            1 => WorkerMode::Drain,
            _ => WorkerMode::Stop,
        }
    }
}

struct Shared {
    mode: AtomicU8,
    fault: Mutex<Option<Error>>,
}

struct WorkerContext {
    direction: Direction,
    transport: Arc<dyn Transport>,
    ends: Endpoints,
    budget: Arc<TransferBudget>,
    drain_timeout: Duration,
    metrics: Arc<StreamMetrics>,
    shared: Arc<Shared>,
}

/// Background thread moving buffers between a pool and the transport.
///
/// It keeps at most `budget.limit()` buffers submitted, forwards each
/// completed buffer to the pool, and parks the first transport failure for
/// the caller to pick up.
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    direction: Direction,
}

impl Worker {
    pub fn spawn(
        direction: Direction,
        transport: Arc<dyn Transport>,
        ends: Endpoints,
        budget: Arc<TransferBudget>,
        drain_timeout: Duration,
        metrics: Arc<StreamMetrics>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            mode: AtomicU8::new(WorkerMode::Run as u8),
            fault: Mutex::new(None),
        });

        let context = WorkerContext {
            direction,
            transport,
            ends,
            budget,
            drain_timeout,
            metrics,
            shared: shared.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("sdrcore-{}", direction).to_lowercase())
            .spawn(move || context.run())?;

        log::debug!(target: STREAM_TARGET, "{} worker started", direction);

        Ok(Self {
            handle: Some(handle),
            shared,
            direction,
        })
    }

    /// Failure observed by the worker, if any
    pub fn fault(&self) -> Option<Error> {
        self.shared
            .fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal `mode` and wait for the thread to exit
    pub fn shutdown(&mut self, mode: WorkerMode) {
        self.shared.mode.store(mode as u8, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!(target: STREAM_TARGET, "{} worker panicked", self.direction);
            }
        }
        log::debug!(target: STREAM_TARGET, "{} worker stopped ({:?})", self.direction, mode);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown(WorkerMode::Stop);
        }
    }
}

impl WorkerContext {
    fn mode(&self) -> WorkerMode {
        WorkerMode::from_u8(self.shared.mode.load(Ordering::Acquire))
    }

    fn run(self) {
        let mut drain_deadline: Option<Instant> = None;

        loop {
            match self.mode() {
                WorkerMode::Stop => break,
                WorkerMode::Drain => {
                    let deadline =
                        *drain_deadline.get_or_insert_with(|| Instant::now() + self.drain_timeout);
                    if self.budget.in_flight() == 0 && self.ends.take.is_empty() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        log::warn!(
                            target: STREAM_TARGET,
                            "{} drain timed out with {} transfers in flight",
                            self.direction,
                            self.budget.in_flight()
                        );
                        break;
                    }
                }
                WorkerMode::Run => {}
            }

            if let Err(err) = self.submit_ready() {
                self.fail(err);
                break;
            }

            if self.budget.in_flight() == 0 {
                // Nothing outstanding: wait for the next buffer to be handed over
                match self.ends.take.recv_timeout(POLL_INTERVAL) {
                    Ok(buffer) => {
                        if let Err(err) = self.submit(buffer) {
                            self.fail(err);
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                continue;
            }

            match self.transport.poll_complete(self.direction, POLL_INTERVAL) {
                Ok(Some(buffer)) => {
                    self.budget.release();
                    self.metrics.record_buffer();
                    if self.ends.give.send(buffer).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    self.fail(err);
                    break;
                }
            }
        }
    }

    /// Submit queued buffers until the in-flight budget is used up
    fn submit_ready(&self) -> Result<()> {
        while self.budget.try_acquire() {
            match self.ends.take.try_recv() {
                Ok(buffer) => {
                    if let Err(err) = self.transport.submit(self.direction, buffer) {
                        self.budget.release();
                        return Err(err);
                    }
                }
                Err(_) => {
                    self.budget.release();
                    break;
                }
            }
        }
        Ok(())
    }

    fn submit(&self, buffer: Vec<u8>) -> Result<()> {
        if !self.budget.try_acquire() {
            return Err(Error::Unexpected("transfer budget exhausted while idle".into()));
        }
        self.transport.submit(self.direction, buffer).inspect_err(|_| self.budget.release())
    }

    fn fail(&self, err: Error) {
        log::warn!(target: STREAM_TARGET, "{} transfer failed: {}", self.direction, err);
        self.metrics.record_fault();
        let mut fault = self
            .shared
            .fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fault.get_or_insert(err);
    }
}
