//! Output capability
//!
//! An output is a delivery backend (search engine, broker, file, console).
//! The publisher only relies on the capabilities below; how a batch is encoded
//! and transmitted is entirely up to the backend.
//!
//! ```text
//! [OutputWorker] --&[Message]--> Output::send() --> [Destination]
//!                                 Output::topology() --> TopologyStore (optional)
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

/// Errors reported by outputs
#[derive(Debug, Error)]
pub enum OutputError {
    /// Output initialization failed
    #[error("failed to initialize output: {0}")]
    Init(String),

    /// Invalid output settings
    #[error("configuration error: {0}")]
    Config(String),

    /// Sending a batch failed
    #[error("send failed: {0}")]
    Send(String),

    /// Topology storage or lookup failed
    #[error("topology error: {0}")]
    Topology(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OutputError {
    /// Create an initialization error
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a send error
    pub fn send(msg: impl Into<String>) -> Self {
        Self::Send(msg.into())
    }

    /// Create a topology error
    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }
}

/// Delivery backend driven by a single output worker
///
/// `send` is called from exactly one worker task, never concurrently for the
/// same worker. Retrying is the backend's own business: the worker reports the
/// returned outcome to the messages' signalers and moves on.
#[async_trait]
pub trait Output: Send + Sync + 'static {
    /// Deliver a batch of messages
    async fn send(&self, batch: &[Message]) -> Result<(), OutputError>;

    /// Topology capability, if this backend can store node addresses
    fn topology(&self) -> Option<&dyn TopologyStore> {
        None
    }

    /// Release resources after the worker has exited
    async fn close(&self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Node-name <-> address store
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// Replace the address set recorded for `name`
    async fn publish_ips(&self, name: &str, ips: &[String]) -> Result<(), OutputError>;

    /// Reverse lookup: which node owns `ip`
    async fn name_by_ip(&self, ip: &str) -> Result<Option<String>, OutputError>;
}
