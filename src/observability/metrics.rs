use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one direction's stream, shared by the caller and the worker
pub struct StreamMetrics {
    stream_id: String,
    buffers_transferred: AtomicU64,
    samples: AtomicU64,
    timeouts: AtomicU64,
    overruns: AtomicU64,
    faults: AtomicU64,
}

/// Point-in-time copy of [`StreamMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub stream_id: String,
    pub buffers_transferred: u64,
    pub samples: u64,
    pub timeouts: u64,
    pub overruns: u64,
    pub faults: u64,
}

impl StreamMetrics {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            buffers_transferred: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn record_buffer(&self) {
        self.buffers_transferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_samples(&self, count: usize) {
        self.samples.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn buffers_transferred(&self) -> u64 {
        self.buffers_transferred.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            stream_id: self.stream_id.clone(),
            buffers_transferred: self.buffers_transferred.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = StreamMetrics::new("abc:RX");
        metrics.record_buffer();
        metrics.record_samples(1024);
        metrics.record_samples(512);
        metrics.record_timeout();

        let stats = metrics.snapshot();
        assert_eq!(stats.stream_id, "abc:RX");
        assert_eq!(stats.buffers_transferred, 1);
        assert_eq!(stats.samples, 1536);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.overruns, 0);

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"samples\":1536"));
    }
}
