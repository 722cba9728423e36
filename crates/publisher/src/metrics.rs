//! Output worker metrics
//!
//! Atomic counters for tracking one worker's queue and delivery activity.
//! All operations use relaxed ordering; values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single output worker
///
/// Shared between the enqueue side (pipelines) and the worker loop, so every
/// method takes `&self`.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Messages accepted into either queue
    messages_enqueued: AtomicU64,

    /// Messages refused because a shutdown signal had stopped
    messages_rejected: AtomicU64,

    /// Times an enqueue found the target queue full
    backpressure_events: AtomicU64,

    /// Backend `send` calls that succeeded
    batches_sent: AtomicU64,

    /// Events carried by successful `send` calls
    events_sent: AtomicU64,

    /// Backend `send` calls that failed
    send_failures: AtomicU64,
}

impl WorkerMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            messages_enqueued: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            backpressure_events: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            events_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_enqueued(&self) {
        self.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_backpressure(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful backend call carrying `event_count` events
    #[inline]
    pub fn record_sent(&self, event_count: u64) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_sent.fetch_add(event_count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of all counters
    #[inline]
    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`WorkerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerMetricsSnapshot {
    pub messages_enqueued: u64,
    pub messages_rejected: u64,
    pub backpressure_events: u64,
    pub batches_sent: u64,
    pub events_sent: u64,
    pub send_failures: u64,
}

impl WorkerMetricsSnapshot {
    /// Fraction of backend calls that succeeded, `None` before the first call
    pub fn send_success_rate(&self) -> Option<f64> {
        let total = self.batches_sent + self.send_failures;
        if total == 0 {
            return None;
        }
        Some(self.batches_sent as f64 / total as f64)
    }

    /// Counter deltas since `previous`
    pub fn diff(&self, previous: &WorkerMetricsSnapshot) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            messages_enqueued: self.messages_enqueued.saturating_sub(previous.messages_enqueued),
            messages_rejected: self.messages_rejected.saturating_sub(previous.messages_rejected),
            backpressure_events: self
                .backpressure_events
                .saturating_sub(previous.backpressure_events),
            batches_sent: self.batches_sent.saturating_sub(previous.batches_sent),
            events_sent: self.events_sent.saturating_sub(previous.events_sent),
            send_failures: self.send_failures.saturating_sub(previous.send_failures),
        }
    }
}
