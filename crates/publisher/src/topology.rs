//! Topology registration
//!
//! This node's addresses are stored in the one output designated as topology
//! store; reverse lookups (ip -> node name) go through the same store. A
//! background task republishes the local addresses periodically until its
//! cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{PublisherError, Result};
use crate::net;
use crate::output::Output;

/// Node identity bound to the topology-store output
pub(crate) struct Topology {
    name: String,
    output_name: String,
    output: Arc<dyn Output>,
}

impl Topology {
    /// Bind `output` as topology store
    ///
    /// # Errors
    /// Returns `PublisherError::TopologyNotSupported` if the output has no
    /// topology capability
    pub fn new(name: String, output_name: &str, output: Arc<dyn Output>) -> Result<Self> {
        if output.topology().is_none() {
            return Err(PublisherError::topology_not_supported(output_name));
        }
        Ok(Self {
            name,
            output_name: output_name.to_string(),
            output,
        })
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Replace this node's address set in the store
    pub async fn publish(&self, ips: &[String]) -> Result<()> {
        let Some(store) = self.output.topology() else {
            return Ok(());
        };

        tracing::debug!(name = %self.name, ips = ?ips, "adding topology entry");
        store
            .publish_ips(&self.name, ips)
            .await
            .map_err(PublisherError::Topology)
    }

    /// Node owning `ip`, or an empty string if unknown
    pub async fn name_by_ip(&self, ip: &str) -> String {
        let Some(store) = self.output.topology() else {
            return String::new();
        };

        match store.name_by_ip(ip).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                tracing::debug!(ip, "no topology entry for address");
                String::new()
            }
            Err(e) => {
                tracing::warn!(ip, output = %self.output_name, error = %e, "topology lookup failed");
                String::new()
            }
        }
    }

    /// Republish the local addresses every `period` until `cancel` fires
    ///
    /// The first tick is skipped: construction already published once.
    pub async fn refresh(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let ips = net::local_ip_addrs();
                    if let Err(e) = self.publish(&ips).await {
                        tracing::warn!(name = %self.name, error = %e, "topology refresh failed");
                    }
                }
            }
        }

        tracing::debug!(name = %self.name, "topology refresh stopped");
    }
}
