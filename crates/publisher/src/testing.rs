//! Test doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::event::Event;
use crate::message::{Message, SignalOutcome, Signaler};
use crate::output::{Output, OutputError, TopologyStore};
use crate::registry::{OutputContext, OutputFactory};

/// Signaler recording every outcome it receives
#[derive(Default)]
pub struct Recorder {
    outcomes: Mutex<Vec<SignalOutcome>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn outcomes(&self) -> Vec<SignalOutcome> {
        self.outcomes.lock().clone()
    }
}

impl Signaler for Recorder {
    fn signal(&self, outcome: SignalOutcome) {
        self.outcomes.lock().push(outcome);
    }
}

/// In-memory topology table
#[derive(Default)]
pub struct TopologyTable {
    entries: Mutex<HashMap<String, Vec<String>>>,
    publishes: AtomicUsize,
    fail: AtomicBool,
}

impl TopologyTable {
    pub fn entries(&self) -> HashMap<String, Vec<String>> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl TopologyStore for TopologyTable {
    async fn publish_ips(&self, name: &str, ips: &[String]) -> Result<(), OutputError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutputError::topology("store unavailable"));
        }
        self.entries.lock().insert(name.to_string(), ips.to_vec());
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn name_by_ip(&self, ip: &str) -> Result<Option<String>, OutputError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutputError::topology("store unavailable"));
        }
        Ok(self
            .entries
            .lock()
            .iter()
            .find(|(_, ips)| ips.iter().any(|candidate| candidate == ip))
            .map(|(name, _)| name.clone()))
    }
}

/// Output recording every batch handed to `send`
#[derive(Default)]
pub struct RecordingOutput {
    batches: Mutex<Vec<Vec<Message>>>,
    fail: AtomicBool,
    closed: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    topology: Option<TopologyTable>,
}

impl RecordingOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Output whose every `send` waits for a permit on `gate`
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        let output = Self::default();
        output.fail.store(true, Ordering::SeqCst);
        Arc::new(output)
    }

    /// Output that also acts as topology store
    pub fn with_topology() -> Arc<Self> {
        Arc::new(Self {
            topology: Some(TopologyTable::default()),
            ..Default::default()
        })
    }

    pub fn set_topology_failing(&self, fail: bool) {
        if let Some(table) = &self.topology {
            table.fail.store(fail, Ordering::SeqCst);
        }
    }

    pub fn topology_entries(&self) -> HashMap<String, Vec<String>> {
        self.topology
            .as_ref()
            .map(TopologyTable::entries)
            .unwrap_or_default()
    }

    /// Number of successful topology updates
    pub fn topology_publishes(&self) -> usize {
        self.topology
            .as_ref()
            .map_or(0, |table| table.publishes.load(Ordering::SeqCst))
    }

    /// Sizes (in messages) of every batch sent so far
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    /// Every delivered event, in delivery order
    pub fn events(&self) -> Vec<Event> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .flat_map(|msg| msg.events().to_vec())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Output for RecordingOutput {
    async fn send(&self, batch: &[Message]) -> Result<(), OutputError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| OutputError::send("gate closed"))?
                .forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutputError::send("backend unavailable"));
        }
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }

    fn topology(&self) -> Option<&dyn TopologyStore> {
        self.topology.as_ref().map(|t| t as &dyn TopologyStore)
    }

    async fn close(&self) -> Result<(), OutputError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out a pre-built output
pub struct StaticFactory {
    output: Arc<RecordingOutput>,
    exempt: bool,
}

impl StaticFactory {
    pub fn new(output: Arc<RecordingOutput>) -> Self {
        Self {
            output,
            exempt: false,
        }
    }

    pub fn exempt(output: Arc<RecordingOutput>) -> Self {
        Self {
            output,
            exempt: true,
        }
    }
}

impl OutputFactory for StaticFactory {
    fn create(&self, _ctx: &OutputContext<'_>) -> Result<Arc<dyn Output>, OutputError> {
        Ok(self.output.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }

    fn dry_run_exempt(&self) -> bool {
        self.exempt
    }
}

/// Factory that always fails
pub struct BrokenFactory;

impl OutputFactory for BrokenFactory {
    fn create(&self, _ctx: &OutputContext<'_>) -> Result<Arc<dyn Output>, OutputError> {
        Err(OutputError::init("connection refused"))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

pub fn event(n: i64) -> Event {
    Event::new().with("n", n)
}
