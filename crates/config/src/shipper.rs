//! Shipper (publisher-level) configuration
//!
//! Settings that apply to the whole publisher rather than to a single output:
//! node identity, topology refresh, queue capacities and the metadata stamped
//! onto every event.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Default capacity of each output worker's message queue (`hwm`)
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Default capacity of each output worker's batch queue (`bulkHWM`, 0 = unbatched)
pub const DEFAULT_BULK_QUEUE_SIZE: usize = 0;

/// Default topology refresh interval
pub const DEFAULT_REFRESH_TOPOLOGY_FREQ: Duration = Duration::from_secs(10);

/// Default lifetime of a topology entry in the topology store
pub const DEFAULT_TOPOLOGY_EXPIRE: Duration = Duration::from_secs(15);

/// Publisher-level configuration
///
/// All fields have defaults; an empty `[shipper]` section is valid.
///
/// # Example
///
/// ```toml
/// [shipper]
/// name = "edge-01"
/// refresh_topology_freq = "30s"
/// queue_size = 2048
/// bulk_queue_size = 64
/// tags = ["web"]
///
/// [shipper.fields]
/// env = "prod"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Node name override; the host name is used when empty
    pub name: String,

    /// How often this node republishes its addresses to the topology store.
    /// `0s` selects the default.
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub refresh_topology_freq: Duration,

    /// Whether producers should ignore traffic originating from this node
    /// Default: false
    pub ignore_outgoing: bool,

    /// Lifetime of a topology entry, handed to the topology-store output
    /// Default: 15s
    #[serde(with = "humantime_serde")]
    pub topology_expire: Duration,

    /// Message queue capacity per output (`hwm`). Absent or 0 selects the default.
    /// Default: 1000
    pub queue_size: Option<usize>,

    /// Batch queue capacity per output (`bulkHWM`). 0 disables batching.
    /// Default: 0
    pub bulk_queue_size: Option<usize>,

    /// Dry-run mode: only outputs exempt from disablement are created.
    /// Injected by the caller (e.g. from a command-line switch).
    /// Default: false
    pub dry_run: bool,

    /// GeoIP database lookup settings
    pub geoip: GeoipConfig,

    /// Fields and tags added to every event
    #[serde(flatten)]
    pub metadata: EventMetadata,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            refresh_topology_freq: DEFAULT_REFRESH_TOPOLOGY_FREQ,
            ignore_outgoing: false,
            topology_expire: DEFAULT_TOPOLOGY_EXPIRE,
            queue_size: None,
            bulk_queue_size: None,
            dry_run: false,
            geoip: GeoipConfig::default(),
            metadata: EventMetadata::default(),
        }
    }
}

impl ShipperConfig {
    /// Effective message queue capacity (`hwm`)
    pub fn queue_capacity(&self) -> usize {
        match self.queue_size {
            Some(size) if size > 0 => size,
            _ => DEFAULT_QUEUE_SIZE,
        }
    }

    /// Effective batch queue capacity (`bulkHWM`)
    pub fn bulk_queue_capacity(&self) -> usize {
        self.bulk_queue_size.unwrap_or(DEFAULT_BULK_QUEUE_SIZE)
    }

    /// Effective topology refresh interval
    pub fn refresh_interval(&self) -> Duration {
        if self.refresh_topology_freq.is_zero() {
            DEFAULT_REFRESH_TOPOLOGY_FREQ
        } else {
            self.refresh_topology_freq
        }
    }

    /// Configured node name, if any
    pub fn node_name(&self) -> Option<&str> {
        let name = self.name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Fields and tags stamped onto every published event
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventMetadata {
    /// Extra fields, placed under `fields` unless `fields_under_root` is set
    pub fields: Map<String, Value>,

    /// Place `fields` at the root of the event instead of under `fields`
    pub fields_under_root: bool,

    /// Tags appended to the event's `tags` list
    pub tags: Vec<String>,
}

impl EventMetadata {
    /// Check if there is nothing to stamp
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.tags.is_empty()
    }
}

/// GeoIP database settings
///
/// Paths are tried in order and the first existing file wins.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeoipConfig {
    /// Candidate database paths
    pub paths: Vec<String>,
}
