//! Memory Output - In-process event buffer and topology store
//!
//! Every delivered event is appended to a [`MemoryStore`] that the assembling
//! process (or a test) can inspect. The same store keeps the node topology:
//! one address list per node name, each entry stamped with the time it was
//! published and ignored by lookups once older than `topology_expire`.
//!
//! # Settings
//!
//! ```toml
//! [output.memory]
//! save_topology = true
//! fail_sends = false   # make every send fail, to exercise failure paths
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use beacon_publisher::{Event, Message, Output, OutputContext, OutputError, OutputFactory, TopologyStore};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

/// Settings for the memory output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Fail every send
    pub fail_sends: bool,
}

struct TopologyEntry {
    ips: Vec<String>,
    published: Instant,
}

/// Shared buffer of delivered events plus the topology table
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<Event>>,
    batches: AtomicU64,
    topology: Mutex<HashMap<String, TopologyEntry>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of every event delivered so far, in delivery order
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Remove and return every buffered event
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Number of successful `send` calls
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Address list published by `name`, regardless of age
    pub fn topology_entry(&self, name: &str) -> Option<Vec<String>> {
        self.topology.lock().get(name).map(|entry| entry.ips.clone())
    }

    /// Names with a topology entry, sorted
    pub fn topology_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.topology.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn append(&self, batch: &[Message]) {
        let mut events = self.events.lock();
        events.extend(batch.iter().flat_map(Message::events).cloned());
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    fn store_topology(&self, name: &str, ips: &[String]) {
        self.topology.lock().insert(
            name.to_string(),
            TopologyEntry {
                ips: ips.to_vec(),
                published: Instant::now(),
            },
        );
    }

    /// Owner of `ip` among entries younger than `expire` (zero: never expire)
    fn lookup(&self, ip: &str, expire: Duration) -> Option<String> {
        let topology = self.topology.lock();
        topology
            .iter()
            .filter(|(_, entry)| expire.is_zero() || entry.published.elapsed() < expire)
            .find(|(_, entry)| entry.ips.iter().any(|candidate| candidate == ip))
            .map(|(name, _)| name.clone())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("events", &self.len())
            .field("batches", &self.batches())
            .field("topology", &self.topology_names())
            .finish()
    }
}

/// Output appending to a [`MemoryStore`]
pub struct MemoryOutput {
    store: Arc<MemoryStore>,
    expire: Duration,
    config: MemoryConfig,
}

impl MemoryOutput {
    pub fn new(store: Arc<MemoryStore>, expire: Duration, config: MemoryConfig) -> Self {
        Self {
            store,
            expire,
            config,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl Output for MemoryOutput {
    async fn send(&self, batch: &[Message]) -> Result<(), OutputError> {
        if self.config.fail_sends {
            return Err(OutputError::send("memory output configured to fail"));
        }
        self.store.append(batch);
        Ok(())
    }

    fn topology(&self) -> Option<&dyn TopologyStore> {
        Some(self as &dyn TopologyStore)
    }
}

#[async_trait]
impl TopologyStore for MemoryOutput {
    async fn publish_ips(&self, name: &str, ips: &[String]) -> Result<(), OutputError> {
        self.store.store_topology(name, ips);
        Ok(())
    }

    async fn name_by_ip(&self, ip: &str) -> Result<Option<String>, OutputError> {
        Ok(self.store.lookup(ip, self.expire))
    }
}

/// Factory for `type = "memory"`
///
/// Every output created by one factory shares the factory's store.
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    store: Arc<MemoryStore>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Factory writing into an existing store
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFactory for MemoryFactory {
    fn create(&self, ctx: &OutputContext<'_>) -> Result<Arc<dyn Output>, OutputError> {
        let config: MemoryConfig = ctx.settings()?;
        tracing::info!(
            output = %ctx.output_name,
            topology_expire = ?ctx.topology_expire,
            fail_sends = config.fail_sends,
            "memory output created"
        );
        Ok(Arc::new(MemoryOutput::new(
            Arc::clone(&self.store),
            ctx.topology_expire,
            config,
        )))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
