use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use crate::error::{Error, Result};
use crate::hal::types::{Channel, Direction, QuickTune};

/// Pending retunes allowed per channel
pub const RETUNE_QUEUE_DEPTH: usize = 16;

/// A frequency change to apply once the channel's hardware clock reaches
/// `timestamp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetuneRequest {
    pub channel: Channel,
    pub timestamp: u64,
    pub frequency: u64,
    pub quick_tune: Option<QuickTune>,
}

/// Heap entry: earliest timestamp first, then FIFO by sequence number
struct QueuedRetune {
    request: RetuneRequest,
    seq: u64,
}

impl PartialEq for QueuedRetune {
    fn eq(&self, other: &Self) -> bool {
        self.request.timestamp == other.request.timestamp && self.seq == other.seq
    }
}

impl Eq for QueuedRetune {}

impl PartialOrd for QueuedRetune {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRetune {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert so the earliest request pops first
        match other.request.timestamp.cmp(&self.request.timestamp) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

/// Per-channel timestamp-ordered retune queues
#[derive(Default)]
pub struct RetuneScheduler {
    queues: BTreeMap<Channel, BinaryHeap<QueuedRetune>>,
    next_seq: u64,
}

impl RetuneScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `request`, given the channel's current hardware time `now`.
    pub fn schedule(&mut self, request: RetuneRequest, now: u64) -> Result<()> {
        if request.timestamp <= now {
            return Err(Error::TimeInPast(format!(
                "retune of {} at {} but the clock is at {}",
                request.channel, request.timestamp, now
            )));
        }

        let queue = self.queues.entry(request.channel).or_default();
        if queue.len() >= RETUNE_QUEUE_DEPTH {
            return Err(Error::QueueFull(format!(
                "{} already has {} pending retunes",
                request.channel, RETUNE_QUEUE_DEPTH
            )));
        }

        queue.push(QueuedRetune {
            request,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        Ok(())
    }

    /// Remove and return every request whose time has come, in application
    /// order. `now` gives the hardware time of each direction.
    pub fn take_due(&mut self, now: impl Fn(Direction) -> u64) -> Vec<RetuneRequest> {
        let mut due: Vec<QueuedRetune> = Vec::new();
        for (channel, queue) in self.queues.iter_mut() {
            let clock = now(channel.direction);
            while queue
                .peek()
                .is_some_and(|next| next.request.timestamp <= clock)
            {
                if let Some(entry) = queue.pop() {
                    due.push(entry);
                }
            }
        }
        // Reverse of the heap order is ascending (timestamp, seq)
        due.sort_by(|a, b| b.cmp(a));
        due.into_iter().map(|entry| entry.request).collect()
    }

    /// Drop every pending request for `channel`; returns how many were dropped
    pub fn cancel(&mut self, channel: Channel) -> usize {
        self.queues.remove(&channel).map_or(0, |queue| queue.len())
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    pub fn pending(&self, channel: Channel) -> usize {
        self.queues.get(&channel).map_or(0, |queue| queue.len())
    }

    /// Timestamp of the next request due on `channel`
    pub fn next_due(&self, channel: Channel) -> Option<u64> {
        self.queues
            .get(&channel)
            .and_then(|queue| queue.peek())
            .map(|entry| entry.request.timestamp)
    }
}
