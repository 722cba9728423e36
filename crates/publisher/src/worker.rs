//! Output worker - per-backend relay with bounded queues
//!
//! Each configured output gets one worker. The pipelines push [`Message`]s into
//! its queues; a single task drains them and calls [`Output::send`].
//!
//! ```text
//!                ┌── queue (hwm) ─────────┐
//! Pipeline ──────┤                        ├──→ WorkerLoop ──→ Output::send(&[Message])
//!                └── bulk queue (bulkHWM) ┘        │
//!                                                  └──→ Signaler (Completed / Failed)
//! ```
//!
//! # Shutdown
//!
//! Enqueueing never writes into a torn-down channel: a slot is first reserved
//! while racing both shutdown signals, and only a reserved slot receives the
//! message. When the loop exits it closes its receivers and drains whatever
//! is left (including messages sent through still-outstanding reservations),
//! reporting `Canceled` for each.
//!
//! # Ordering
//!
//! Every accepted message is stamped with a per-worker sequence number. The
//! loop always dispatches the lowest stamp across both queues, and a batch run
//! stops at the first single message accepted before the next batch item, so
//! one producer's messages reach the backend in the order it sent them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use beacon_config::MAX_QUEUE_SIZE;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::WorkerError;
use crate::message::{Message, SignalOutcome};
use crate::metrics::WorkerMetrics;
use crate::output::{Output, OutputError};
use crate::signal::WorkerSignal;

#[cfg(test)]
#[path = "worker_test.rs"]
mod tests;

/// Message stamped with the position its enqueue was accepted at
struct Queued {
    seq: u64,
    msg: Message,
}

enum Lane {
    Single,
    Bulk,
}

/// Enqueue side of an output worker
///
/// Shared by both pipelines. The matching [`WorkerLoop`] must be spawned for
/// messages to reach the backend.
pub struct OutputWorker {
    name: String,
    output: Arc<dyn Output>,
    signal: Arc<WorkerSignal>,
    queue: mpsc::Sender<Queued>,
    bulk_queue: Option<mpsc::Sender<Queued>>,
    seq: AtomicU64,
    metrics: Arc<WorkerMetrics>,
    hwm: usize,
    bulk_hwm: usize,
}

impl OutputWorker {
    /// Create a worker and the loop that drains it
    ///
    /// `hwm` is the message queue capacity (at least 1). A `bulk_hwm` of zero
    /// disables the batch queue. Both are capped at [`MAX_QUEUE_SIZE`].
    pub fn new(
        name: impl Into<String>,
        output: Arc<dyn Output>,
        signal: Arc<WorkerSignal>,
        hwm: usize,
        bulk_hwm: usize,
    ) -> (Self, WorkerLoop) {
        let name = name.into();
        let hwm = hwm.clamp(1, MAX_QUEUE_SIZE);
        let bulk_hwm = bulk_hwm.min(MAX_QUEUE_SIZE);
        let metrics = Arc::new(WorkerMetrics::new());

        let (tx, rx) = mpsc::channel(hwm);
        let (bulk_tx, bulk_rx) = if bulk_hwm > 0 {
            let (tx, rx) = mpsc::channel(bulk_hwm);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        tracing::debug!(output = %name, hwm, bulk_hwm, "output worker created");

        let worker = Self {
            name: name.clone(),
            output: Arc::clone(&output),
            signal: Arc::clone(&signal),
            queue: tx,
            bulk_queue: bulk_tx,
            seq: AtomicU64::new(0),
            metrics: Arc::clone(&metrics),
            hwm,
            bulk_hwm,
        };

        let worker_loop = WorkerLoop {
            name,
            output,
            signal,
            queue: rx,
            bulk_queue: bulk_rx,
            pending: None,
            pending_bulk: None,
            metrics,
            bulk_hwm,
        };

        (worker, worker_loop)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn output(&self) -> &Arc<dyn Output> {
        &self.output
    }

    #[inline]
    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Message queue capacity
    #[inline]
    pub fn hwm(&self) -> usize {
        self.hwm
    }

    /// Batch queue capacity (0 = unbatched)
    #[inline]
    pub fn bulk_hwm(&self) -> usize {
        self.bulk_hwm
    }

    /// Check if the output-side signal has stopped
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }

    /// Queue a message, waiting while the target queue is full
    ///
    /// Returns false, after reporting `Canceled` to the message's signaler,
    /// if either `pipeline` or this worker's signal stops first.
    pub async fn enqueue(&self, msg: Message, pipeline: &WorkerSignal) -> bool {
        if pipeline.is_stopped() || self.signal.is_stopped() {
            self.reject(&msg);
            return false;
        }

        let tx = self.sender_for(&msg);
        let permit = match tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                self.metrics.record_backpressure();
                tracing::trace!(output = %self.name, "output queue full, waiting");

                let reserved = tokio::select! {
                    biased;
                    _ = pipeline.stopped() => None,
                    _ = self.signal.stopped() => None,
                    permit = tx.reserve() => permit.ok(),
                };
                match reserved {
                    Some(permit) => permit,
                    None => {
                        self.reject(&msg);
                        return false;
                    }
                }
            }
            Err(TrySendError::Closed(())) => {
                self.reject(&msg);
                return false;
            }
        };

        permit.send(self.stamp(msg));
        self.metrics.record_enqueued();
        true
    }

    /// Queue a message only if a slot is free right now
    ///
    /// The message is cloned into the queue on success; on failure the caller
    /// keeps ownership and no signaler is invoked.
    ///
    /// # Errors
    /// - `WorkerError::Stopped` if the worker signal has stopped
    /// - `WorkerError::Full` if the target queue is at capacity
    pub fn try_enqueue(&self, msg: &Message) -> Result<(), WorkerError> {
        if self.signal.is_stopped() {
            return Err(WorkerError::Stopped);
        }

        match self.sender_for(msg).try_reserve() {
            Ok(permit) => {
                permit.send(self.stamp(msg.clone()));
                self.metrics.record_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(())) => {
                self.metrics.record_backpressure();
                Err(WorkerError::Full)
            }
            Err(TrySendError::Closed(())) => Err(WorkerError::Stopped),
        }
    }

    fn stamp(&self, msg: Message) -> Queued {
        Queued {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            msg,
        }
    }

    fn sender_for(&self, msg: &Message) -> &mpsc::Sender<Queued> {
        match &self.bulk_queue {
            Some(bulk) if msg.is_bulk() => bulk,
            _ => &self.queue,
        }
    }

    fn reject(&self, msg: &Message) {
        self.metrics.record_rejected();
        msg.signal(SignalOutcome::Canceled);
    }
}

impl fmt::Debug for OutputWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputWorker")
            .field("name", &self.name)
            .field("hwm", &self.hwm)
            .field("bulk_hwm", &self.bulk_hwm)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Receive side of an output worker, run as its own task
pub struct WorkerLoop {
    name: String,
    output: Arc<dyn Output>,
    signal: Arc<WorkerSignal>,
    queue: mpsc::Receiver<Queued>,
    bulk_queue: Option<mpsc::Receiver<Queued>>,
    /// Head of each queue, taken but not yet dispatched
    pending: Option<Queued>,
    pending_bulk: Option<Queued>,
    metrics: Arc<WorkerMetrics>,
    bulk_hwm: usize,
}

impl WorkerLoop {
    /// Drain the queues into the backend until the signal stops
    pub async fn run(mut self) {
        tracing::info!(output = %self.name, bulk_hwm = self.bulk_hwm, "output worker started");

        loop {
            if self.signal.is_stopped() {
                break;
            }

            self.fill_pending();
            match self.next_lane() {
                Some(Lane::Single) => {
                    if let Some(next) = self.pending.take() {
                        self.send_one(next.msg).await;
                    }
                }
                Some(Lane::Bulk) => {
                    if let Some(next) = self.pending_bulk.take() {
                        self.send_bulk(next.msg).await;
                    }
                }
                None => {
                    tokio::select! {
                        biased;
                        _ = self.signal.stopped() => break,
                        next = self.queue.recv() => match next {
                            Some(next) => self.pending = Some(next),
                            None => break,
                        },
                        next = recv_bulk(&mut self.bulk_queue) => match next {
                            Some(next) => self.pending_bulk = Some(next),
                            None => break,
                        },
                    }
                }
            }
        }

        let canceled = self.drain().await;
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            output = %self.name,
            enqueued = snapshot.messages_enqueued,
            batches_sent = snapshot.batches_sent,
            events_sent = snapshot.events_sent,
            send_failures = snapshot.send_failures,
            canceled,
            "output worker stopped"
        );
    }

    /// Take the head of each queue that has none pending, without waiting
    fn fill_pending(&mut self) {
        if self.pending.is_none() {
            self.pending = self.queue.try_recv().ok();
        }
        if self.pending_bulk.is_none() {
            self.pending_bulk = self.bulk_queue.as_mut().and_then(|rx| rx.try_recv().ok());
        }
    }

    /// Queue holding the oldest pending message
    fn next_lane(&self) -> Option<Lane> {
        match (&self.pending, &self.pending_bulk) {
            (None, None) => None,
            (Some(_), None) => Some(Lane::Single),
            (None, Some(_)) => Some(Lane::Bulk),
            (Some(single), Some(bulk)) if bulk.seq < single.seq => Some(Lane::Bulk),
            (Some(_), Some(_)) => Some(Lane::Single),
        }
    }

    async fn send_one(&self, msg: Message) {
        let batch = [msg];
        let result = self.output.send(&batch).await;
        self.report(&batch, result);
    }

    async fn send_bulk(&mut self, first: Message) {
        let queued = self.bulk_queue.as_ref().map_or(0, mpsc::Receiver::len);
        let mut batch = Vec::with_capacity(queued.min(self.bulk_hwm) + 1);
        batch.push(first);

        while batch.len() < self.bulk_hwm {
            if self.pending.is_none() {
                self.pending = self.queue.try_recv().ok();
            }
            let Some(next) = self.bulk_queue.as_mut().and_then(|rx| rx.try_recv().ok()) else {
                break;
            };
            // a single message accepted before `next` ends the run
            if self.pending.as_ref().is_some_and(|single| single.seq < next.seq) {
                self.pending_bulk = Some(next);
                break;
            }
            batch.push(next.msg);
        }

        tracing::trace!(output = %self.name, messages = batch.len(), "flushing batch");
        let result = self.output.send(&batch).await;
        self.report(&batch, result);
    }

    fn report(&self, batch: &[Message], result: Result<(), OutputError>) {
        let outcome = match result {
            Ok(()) => {
                let events: usize = batch.iter().map(Message::len).sum();
                self.metrics.record_sent(events as u64);
                SignalOutcome::Completed
            }
            Err(e) => {
                self.metrics.record_send_failure();
                tracing::warn!(
                    output = %self.name,
                    messages = batch.len(),
                    error = %e,
                    "failed to send batch"
                );
                SignalOutcome::Failed
            }
        };

        for msg in batch {
            msg.signal(outcome);
        }
    }

    /// Close both queues and cancel everything still in them
    async fn drain(&mut self) -> u64 {
        let mut canceled = 0;
        for queued in [self.pending.take(), self.pending_bulk.take()].into_iter().flatten() {
            self.cancel(&queued.msg);
            canceled += 1;
        }

        let receivers = std::iter::once(&mut self.queue).chain(self.bulk_queue.as_mut());
        for rx in receivers {
            rx.close();
            while let Some(queued) = rx.recv().await {
                self.metrics.record_rejected();
                queued.msg.signal(SignalOutcome::Canceled);
                canceled += 1;
            }
        }
        canceled
    }

    fn cancel(&self, msg: &Message) {
        self.metrics.record_rejected();
        msg.signal(SignalOutcome::Canceled);
    }
}

impl fmt::Debug for WorkerLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLoop")
            .field("name", &self.name)
            .field("bulk_hwm", &self.bulk_hwm)
            .finish()
    }
}

async fn recv_bulk(rx: &mut Option<mpsc::Receiver<Queued>>) -> Option<Queued> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
