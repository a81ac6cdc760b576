//! Communicator metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics
///
/// Shared between the transport's delivery thread and whoever reports
/// statistics; every counter is relaxed.
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Bytes handed over by the transport
    pub bytes_received: AtomicU64,

    /// Completed frames
    pub frames_parsed: AtomicU64,

    /// Bytes discarded while resynchronizing
    pub resync_bytes: AtomicU64,

    /// Frames sent to the device
    pub frames_sent: AtomicU64,

    /// Frames that arrived with no subscriber attached
    pub frames_orphaned: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bytes(&self, count: usize) {
        self.bytes_received.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.resync_bytes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphaned(&self) {
        self.frames_orphaned.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_parsed: self.frames_parsed.load(Ordering::Relaxed),
            resync_bytes: self.resync_bytes.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_orphaned: self.frames_orphaned.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_received: u64,
    pub frames_parsed: u64,
    pub resync_bytes: u64,
    pub frames_sent: u64,
    pub frames_orphaned: u64,
}
