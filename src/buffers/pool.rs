use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::hal::types::Direction;

/// Fixed set of transfer buffers circulating between a caller and a worker.
///
/// Buffers live in one of two queues: `empty` holds buffers waiting for a
/// producer, `filled` holds buffers waiting for a consumer. For RX the
/// transport produces and the caller consumes; for TX it is the other way
/// round. Both queues are bounded by the pool size, so handing a buffer back
/// never blocks.
pub struct BufferPool {
    empty: (Sender<Vec<u8>>, Receiver<Vec<u8>>),
    filled: (Sender<Vec<u8>>, Receiver<Vec<u8>>),
    num_buffers: usize,
    buffer_bytes: usize,
    budget: Arc<TransferBudget>,
}

/// The pair of queue ends one party of the stream works with
#[derive(Clone)]
pub struct Endpoints {
    /// Where this party picks up buffers
    pub take: Receiver<Vec<u8>>,
    /// Where this party hands buffers on
    pub give: Sender<Vec<u8>>,
}

impl BufferPool {
    /// Allocate `num_buffers` zeroed buffers of `buffer_bytes` each.
    ///
    /// Allocation is fallible; nothing is kept on failure.
    pub fn allocate(num_buffers: usize, buffer_bytes: usize, num_transfers: usize) -> Result<Self> {
        let oom = |what: &str| {
            Error::OutOfMemory(format!(
                "{} for {} buffers of {} bytes",
                what, num_buffers, buffer_bytes
            ))
        };

        let mut buffers: Vec<Vec<u8>> = Vec::new();
        buffers
            .try_reserve_exact(num_buffers)
            .map_err(|_| oom("buffer table"))?;
        for _ in 0..num_buffers {
            let mut buffer = Vec::new();
            buffer
                .try_reserve_exact(buffer_bytes)
                .map_err(|_| oom("sample buffer"))?;
            buffer.resize(buffer_bytes, 0);
            buffers.push(buffer);
        }

        let empty = bounded(num_buffers);
        let filled = bounded(num_buffers);
        for buffer in buffers {
            empty
                .0
                .send(buffer)
                .map_err(|_| Error::Unexpected("buffer queue closed during allocation".into()))?;
        }

        Ok(Self {
            empty,
            filled,
            num_buffers,
            buffer_bytes,
            budget: Arc::new(TransferBudget::new(num_transfers)),
        })
    }

    pub fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    pub fn budget(&self) -> Arc<TransferBudget> {
        self.budget.clone()
    }

    /// Queue ends used by the application side of a `direction` stream
    pub fn caller(&self, direction: Direction) -> Endpoints {
        match direction {
            Direction::Rx => Endpoints {
                take: self.filled.1.clone(),
                give: self.empty.0.clone(),
            },
            Direction::Tx => Endpoints {
                take: self.empty.1.clone(),
                give: self.filled.0.clone(),
            },
        }
    }

    /// Queue ends used by the transfer worker of a `direction` stream
    pub fn worker(&self, direction: Direction) -> Endpoints {
        match direction {
            Direction::Rx => Endpoints {
                take: self.empty.1.clone(),
                give: self.filled.0.clone(),
            },
            Direction::Tx => Endpoints {
                take: self.filled.1.clone(),
                give: self.empty.0.clone(),
            },
        }
    }

    /// Return buffers to the empty queue. Buffers of the wrong size are dropped.
    pub fn reclaim(&self, buffers: impl IntoIterator<Item = Vec<u8>>) {
        for buffer in buffers {
            if buffer.len() != self.buffer_bytes {
                log::warn!(
                    target: "sdrcore::stream",
                    "dropping foreign {} byte buffer",
                    buffer.len()
                );
                continue;
            }
            let _ = self.empty.0.try_send(buffer);
        }
    }

    /// Discard pending data: every filled buffer goes back to the empty queue
    /// and the in-flight count starts over.
    pub fn reset(&self) {
        while let Ok(buffer) = self.filled.1.try_recv() {
            let _ = self.empty.0.try_send(buffer);
        }
        self.budget.reset();
    }

    /// Buffers currently held by the pool (not in flight, not with a caller)
    pub fn available(&self) -> usize {
        self.empty.1.len() + self.filled.1.len()
    }
}

/// Caps the number of buffers owned by the transport at once
pub struct TransferBudget {
    limit: usize,
    in_flight: AtomicUsize,
}

impl TransferBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.limit).then_some(current + 1)
            })
            .is_ok()
    }

    pub fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_sub(1));
    }

    pub fn reset(&self) {
        self.in_flight.store(0, Ordering::Release);
    }
}
