//! Sync and async pipelines
//!
//! Both variants fan a message out to every output worker and differ only in
//! what the caller waits for:
//!
//! - [`AsyncPipeline`] returns once every worker has queued the message; the
//!   message's signaler fires later from the worker tasks.
//! - [`SyncPipeline`] additionally waits until every worker reported back and
//!   returns whether all of them completed.
//!
//! With N workers the caller's signaler is wrapped in a [`SplitSignal`], so it
//! fires exactly once whatever N is.

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::{Message, SignalChannel, SignalOutcome, Signaler, SplitSignal};
use crate::signal::WorkerSignal;
use crate::worker::OutputWorker;

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

/// Dispatch path from a client to the output workers
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Hand `msg` to every output worker
    ///
    /// Returns false if the message was not accepted (shutdown) or, for the
    /// sync pipeline, not delivered.
    async fn publish(&self, msg: Message) -> bool;
}

/// Workers and pipeline-side signal shared by both pipelines
#[derive(Clone)]
struct Fanout {
    workers: Arc<[OutputWorker]>,
    signal: Arc<WorkerSignal>,
}

impl Fanout {
    /// Queue `msg` on every worker, each copy carrying one share of `signaler`
    async fn enqueue_all(&self, msg: &Message, signaler: Option<Arc<dyn Signaler>>) -> bool {
        let mut accepted = true;
        for worker in self.workers.iter() {
            let copy = msg.with_signaler(signaler.clone());
            if !worker.enqueue(copy, &self.signal).await {
                tracing::debug!(output = %worker.name(), "message not accepted, pipeline stopping");
                accepted = false;
            }
        }
        accepted
    }
}

/// Fire-and-forget pipeline
pub struct AsyncPipeline {
    fanout: Fanout,
}

impl AsyncPipeline {
    pub fn new(workers: Arc<[OutputWorker]>, signal: Arc<WorkerSignal>) -> Self {
        Self {
            fanout: Fanout { workers, signal },
        }
    }
}

#[async_trait]
impl Pipeline for AsyncPipeline {
    async fn publish(&self, msg: Message) -> bool {
        let shares = self.fanout.workers.len();
        if shares == 0 {
            msg.signal(SignalOutcome::Completed);
            return true;
        }

        let signaler = msg
            .signaler()
            .cloned()
            .and_then(|parent| SplitSignal::split(parent, shares));
        self.fanout.enqueue_all(&msg, signaler).await
    }
}

/// Pipeline waiting for delivery confirmation
pub struct SyncPipeline {
    fanout: Fanout,
}

impl SyncPipeline {
    pub fn new(workers: Arc<[OutputWorker]>, signal: Arc<WorkerSignal>) -> Self {
        Self {
            fanout: Fanout { workers, signal },
        }
    }
}

#[async_trait]
impl Pipeline for SyncPipeline {
    async fn publish(&self, msg: Message) -> bool {
        let shares = self.fanout.workers.len();
        if shares == 0 {
            msg.signal(SignalOutcome::Completed);
            return true;
        }

        let (channel, rx) = SignalChannel::new();
        let shared = SplitSignal::split(channel, shares);
        self.fanout.enqueue_all(&msg, shared).await;

        // a stopped pipeline no longer waits on the workers
        let outcome = tokio::select! {
            biased;
            received = rx => received.unwrap_or(SignalOutcome::Canceled),
            _ = self.fanout.signal.stopped() => SignalOutcome::Canceled,
        };

        msg.signal(outcome);
        outcome.is_completed()
    }
}
