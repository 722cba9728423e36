//! Producer handle
//!
//! A [`Client`] is obtained from [`Publisher::connect`] and counts as a live
//! client until it is dropped or [`disconnect`](Client::disconnect)ed.

use std::fmt;
use std::sync::Arc;

use crate::event::Event;
use crate::message::{Message, Signaler};
use crate::publisher::Publisher;

/// Per-producer publishing handle
pub struct Client {
    publisher: Arc<Publisher>,
}

impl Client {
    pub(crate) fn new(publisher: Arc<Publisher>) -> Self {
        Self { publisher }
    }

    /// Annotate, process and dispatch `msg`
    ///
    /// Messages flagged `sync` or `guaranteed` go through the sync pipeline
    /// and the future resolves once every output has answered; all others
    /// resolve as soon as the message is queued. Returns `false` if the
    /// message was rejected or, for sync messages, not delivered everywhere.
    /// A message whose events are all dropped by processors counts as
    /// delivered.
    pub async fn publish(&self, msg: Message) -> bool {
        let Some(msg) = self.publisher.prepare(msg) else {
            return true;
        };
        self.publisher.pipeline_for(&msg).publish(msg).await
    }

    /// Fire-and-forget single event
    pub async fn publish_event(&self, event: Event) -> bool {
        self.publish(Message::event(event)).await
    }

    /// Fire-and-forget batch
    pub async fn publish_events(&self, events: Vec<Event>) -> bool {
        self.publish(Message::batch(events)).await
    }

    /// Publish `events` as one transaction
    ///
    /// `signaler` fires exactly once, after every output has handled the
    /// batch.
    pub async fn publish_transaction(&self, signaler: Arc<dyn Signaler>, events: Vec<Event>) -> bool {
        self.publish(Message::transaction(signaler, events)).await
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Release this client
    pub fn disconnect(self) {}
}

impl Drop for Client {
    fn drop(&mut self) {
        self.publisher.disconnect();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("publisher", &self.publisher.name())
            .finish()
    }
}
