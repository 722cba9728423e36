//! Messages and completion signalers
//!
//! A [`Message`] is the unit flowing through the pipelines: one or more events
//! sharing an optional [`Signaler`]. The signaler observes exactly one
//! [`SignalOutcome`] per message, no matter how many outputs it fans out to.
//!
//! ```text
//! Client ──Message{events, signaler}──→ Pipeline ──┬─→ Worker A ──┐
//!                                                  └─→ Worker B ──┴─→ SplitSignal ──→ signaler (once)
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::event::Event;

/// Final outcome reported to a signaler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalOutcome {
    /// The backend accepted the message
    Completed,
    /// The backend reported an error
    Failed,
    /// The message never reached a backend (shutdown)
    Canceled,
}

impl SignalOutcome {
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for SignalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Completion callback attached to a message or transaction
///
/// Implementations are called from worker tasks and must not block.
pub trait Signaler: Send + Sync {
    fn signal(&self, outcome: SignalOutcome);
}

/// Report `outcome` if a signaler is present
#[inline]
pub fn notify(signaler: Option<&Arc<dyn Signaler>>, outcome: SignalOutcome) {
    if let Some(signaler) = signaler {
        signaler.signal(outcome);
    }
}

// ============================================================================
// Message
// ============================================================================

/// Unit of work handed to the pipelines
#[derive(Clone, Default)]
pub struct Message {
    events: Arc<Vec<Event>>,
    signaler: Option<Arc<dyn Signaler>>,
    batch: bool,
    transaction: bool,
    sync: bool,
    guaranteed: bool,
}

impl Message {
    /// Message carrying a single event
    pub fn event(event: Event) -> Self {
        Self {
            events: Arc::new(vec![event]),
            ..Default::default()
        }
    }

    /// Message carrying several events published together
    pub fn batch(events: Vec<Event>) -> Self {
        Self {
            events: Arc::new(events),
            batch: true,
            ..Default::default()
        }
    }

    /// Batched message whose signaler fires once for the whole set
    pub fn transaction(signaler: Arc<dyn Signaler>, events: Vec<Event>) -> Self {
        Self {
            events: Arc::new(events),
            signaler: Some(signaler),
            batch: true,
            transaction: true,
            ..Default::default()
        }
    }

    /// Attach a completion signaler
    #[must_use]
    pub fn with_signal(mut self, signaler: Arc<dyn Signaler>) -> Self {
        self.signaler = Some(signaler);
        self
    }

    /// Block the caller until the outputs report back
    #[must_use]
    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    /// Require delivery confirmation; implies synchronous publishing
    #[must_use]
    pub fn guaranteed(mut self) -> Self {
        self.guaranteed = true;
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn signaler(&self) -> Option<&Arc<dyn Signaler>> {
        self.signaler.as_ref()
    }

    pub fn is_batch(&self) -> bool {
        self.batch
    }

    pub fn is_transaction(&self) -> bool {
        self.transaction
    }

    pub fn is_sync(&self) -> bool {
        self.sync
    }

    pub fn is_guaranteed(&self) -> bool {
        self.guaranteed
    }

    /// Whether the caller waits for the outcome
    pub fn wants_sync(&self) -> bool {
        self.sync || self.guaranteed
    }

    /// Whether the message belongs on a worker's batch queue
    pub fn is_bulk(&self) -> bool {
        self.events.len() > 1
    }

    /// Report `outcome` to this message's signaler, if any
    pub fn signal(&self, outcome: SignalOutcome) {
        notify(self.signaler.as_ref(), outcome);
    }

    /// Take the events out, cloning only if they are shared
    pub(crate) fn take_events(&mut self) -> Vec<Event> {
        Arc::try_unwrap(std::mem::take(&mut self.events)).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Replace the events, keeping signaler and flags
    pub(crate) fn replace_events(&mut self, events: Vec<Event>) {
        self.events = Arc::new(events);
    }

    /// Same message with a different signaler
    pub(crate) fn with_signaler(&self, signaler: Option<Arc<dyn Signaler>>) -> Self {
        Self {
            signaler,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("events", &self.events.len())
            .field("signaler", &self.signaler.is_some())
            .field("batch", &self.batch)
            .field("transaction", &self.transaction)
            .field("sync", &self.sync)
            .field("guaranteed", &self.guaranteed)
            .finish()
    }
}

// ============================================================================
// Signalers
// ============================================================================

/// Signaler backed by a closure
pub struct CallbackSignal<F>(F);

impl<F> CallbackSignal<F>
where
    F: Fn(SignalOutcome) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Arc<Self> {
        Arc::new(Self(callback))
    }
}

impl<F> Signaler for CallbackSignal<F>
where
    F: Fn(SignalOutcome) + Send + Sync,
{
    fn signal(&self, outcome: SignalOutcome) {
        (self.0)(outcome);
    }
}

/// Signaler that forwards its first outcome to a [`SignalReceiver`]
///
/// Later outcomes are ignored.
pub struct SignalChannel {
    tx: Mutex<Option<oneshot::Sender<SignalOutcome>>>,
}

/// Receiving half of a [`SignalChannel`]
pub type SignalReceiver = oneshot::Receiver<SignalOutcome>;

impl SignalChannel {
    pub fn new() -> (Arc<Self>, SignalReceiver) {
        let (tx, rx) = oneshot::channel();
        let signal = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        (signal, rx)
    }
}

impl Signaler for SignalChannel {
    fn signal(&self, outcome: SignalOutcome) {
        if let Some(tx) = self.tx.lock().take() {
            // receiver gone means nobody waits anymore
            let _ = tx.send(outcome);
        }
    }
}

/// Fans one signaler out over `shares` independent deliveries
///
/// The parent fires once, after the last share reported: `Completed` when
/// every share completed, otherwise the first other outcome observed.
pub struct SplitSignal {
    parent: Arc<dyn Signaler>,
    remaining: AtomicUsize,
    first_error: Mutex<Option<SignalOutcome>>,
}

impl SplitSignal {
    /// Split `parent` into `shares` parts
    ///
    /// With one share the parent itself is returned. With zero shares the
    /// parent is completed immediately and `None` is returned.
    pub fn split(parent: Arc<dyn Signaler>, shares: usize) -> Option<Arc<dyn Signaler>> {
        match shares {
            0 => {
                parent.signal(SignalOutcome::Completed);
                None
            }
            1 => Some(parent),
            n => Some(Arc::new(Self {
                parent,
                remaining: AtomicUsize::new(n),
                first_error: Mutex::new(None),
            })),
        }
    }
}

impl Signaler for SplitSignal {
    fn signal(&self, outcome: SignalOutcome) {
        if !outcome.is_completed() {
            let mut first = self.first_error.lock();
            first.get_or_insert(outcome);
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let combined = (*self.first_error.lock()).unwrap_or(SignalOutcome::Completed);
            self.parent.signal(combined);
        }
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
