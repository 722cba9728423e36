//! Event processors
//!
//! A [`Processors`] chain runs on every event a client publishes, after
//! annotation and before the pipelines. A processor returning `None` drops the
//! event.
//!
//! - **Sequential**: processors run in registration order
//! - **Drop short-circuits**: once dropped, later processors never see the event
//! - **No-op when empty**: an empty chain returns events unchanged

use crate::event::{BEAT_FIELD, Event, TIMESTAMP_FIELD};

/// One step of event processing
pub trait Processor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Transform an event, or drop it by returning `None`
    fn run(&self, event: Event) -> Option<Event>;
}

/// Ordered processor chain
#[derive(Default)]
pub struct Processors {
    list: Vec<Box<dyn Processor>>,
}

impl Processors {
    pub fn new(list: Vec<Box<dyn Processor>>) -> Self {
        Self { list }
    }

    /// Append a processor
    pub fn push(&mut self, processor: impl Processor + 'static) {
        self.list.push(Box::new(processor));
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.list.iter().map(|p| p.name()).collect()
    }

    /// Run `event` through every processor
    pub fn run(&self, event: Event) -> Option<Event> {
        self.list
            .iter()
            .try_fold(event, |current, processor| processor.run(current))
    }
}

impl std::fmt::Debug for Processors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processors")
            .field("names", &self.names())
            .finish()
    }
}

/// Remove the listed top-level fields
///
/// `@timestamp` and `beat` are never removed.
#[derive(Debug, Clone)]
pub struct DropFields {
    fields: Vec<String>,
}

impl DropFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl Processor for DropFields {
    fn name(&self) -> &'static str {
        "drop_fields"
    }

    fn run(&self, mut event: Event) -> Option<Event> {
        for field in &self.fields {
            if is_protected(field) {
                continue;
            }
            event.remove(field);
        }
        Some(event)
    }
}

/// Keep only the listed top-level fields (plus `@timestamp` and `beat`)
#[derive(Debug, Clone)]
pub struct IncludeFields {
    fields: Vec<String>,
}

impl IncludeFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl Processor for IncludeFields {
    fn name(&self) -> &'static str {
        "include_fields"
    }

    fn run(&self, event: Event) -> Option<Event> {
        let kept = event
            .into_map()
            .into_iter()
            .filter(|(key, _)| is_protected(key) || self.fields.iter().any(|f| f == key))
            .collect::<serde_json::Map<_, _>>();
        Some(Event::from(kept))
    }
}

/// Drop events matching a predicate
pub struct DropEvent<F> {
    predicate: F,
}

impl<F> DropEvent<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> Processor for DropEvent<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn name(&self) -> &'static str {
        "drop_event"
    }

    fn run(&self, event: Event) -> Option<Event> {
        if (self.predicate)(&event) {
            None
        } else {
            Some(event)
        }
    }
}

fn is_protected(field: &str) -> bool {
    field == TIMESTAMP_FIELD || field == BEAT_FIELD
}
