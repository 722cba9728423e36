//! Shutdown signal
//!
//! A three-state latch `Idle -> Running -> Stopped` shared by everything that
//! must stop together. `Stopped` is terminal; stopping twice is a no-op.
//!
//! The publisher owns two of these: the pipeline-side signal is stopped before
//! the output-side one, so no pipeline enqueues onto a worker that has exited.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Observable state of a [`WorkerSignal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Idle,
    Running,
    Stopped,
}

/// One-way shutdown latch observed by workers and pipelines
pub struct WorkerSignal {
    state: AtomicU8,
    token: CancellationToken,
}

impl WorkerSignal {
    /// Create a signal in the `Idle` state
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            token: CancellationToken::new(),
        }
    }

    /// Move `Idle -> Running`; returns false if the signal was not idle
    pub fn init(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `Stopped` and wake every observer
    ///
    /// Returns true only for the call that performed the transition.
    pub fn stop(&self) -> bool {
        let previous = self.state.swap(STOPPED, Ordering::AcqRel);
        if previous == STOPPED {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn state(&self) -> SignalState {
        match self.state.load(Ordering::Acquire) {
            IDLE => SignalState::Idle,
            RUNNING => SignalState::Running,
            _ => SignalState::Stopped,
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STOPPED
    }

    /// Resolves once the signal has stopped
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl Default for WorkerSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSignal")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[test]
    fn test_state_transitions() {
        let signal = WorkerSignal::new();
        assert_eq!(signal.state(), SignalState::Idle);

        assert!(signal.init());
        assert_eq!(signal.state(), SignalState::Running);
        assert!(!signal.init());

        assert!(signal.stop());
        assert_eq!(signal.state(), SignalState::Stopped);
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let signal = WorkerSignal::new();
        signal.init();
        assert!(signal.stop());
        assert!(!signal.stop());
        assert!(!signal.stop());
        assert_eq!(signal.state(), SignalState::Stopped);
    }

    #[test]
    fn test_init_after_stop_fails() {
        let signal = WorkerSignal::new();
        signal.stop();
        assert!(!signal.init());
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_wakes_all_observers() {
        let signal = Arc::new(WorkerSignal::new());
        signal.init();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.stopped().await })
            })
            .collect();

        signal.stop();
        for waiter in waiters {
            timeout(Duration::from_secs(1), waiter)
                .await
                .expect("observer should wake")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_stopped_pending_while_running() {
        let signal = WorkerSignal::new();
        signal.init();
        assert!(
            timeout(Duration::from_millis(20), signal.stopped())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_stopped_ready_after_stop() {
        let signal = WorkerSignal::new();
        signal.stop();
        timeout(Duration::from_millis(20), signal.stopped())
            .await
            .expect("already stopped");
    }
}
