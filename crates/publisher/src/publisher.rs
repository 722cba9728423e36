//! Publisher - process-wide coordinator
//!
//! Owns every output worker, the optional topology store and both pipelines.
//!
//! # Lifecycle
//!
//! ```text
//! Publisher::new ──→ workers spawned, topology published, refresh task spawned
//!      │
//!      ├── connect() ──→ Client (live-client count +1) ── drop/disconnect (-1)
//!      │
//! Publisher::stop ──→ pipeline signal ──→ refresh cancelled ──→ output signal
//!                     ──→ workers drained ──→ outputs closed
//! ```
//!
//! The pipeline-side signal always stops before the output-side one, so a
//! pipeline never hands a message to a worker that has already exited.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use beacon_config::{EventMetadata, GeoipConfig, OutputsConfig, ShipperConfig};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::{PublisherError, Result};
use crate::event::{self, BeatInfo};
use crate::message::{Message, SignalOutcome};
use crate::metrics::WorkerMetricsSnapshot;
use crate::net;
use crate::pipeline::{AsyncPipeline, Pipeline, SyncPipeline};
use crate::processor::Processors;
use crate::registry::{OutputContext, OutputRegistry};
use crate::signal::{SignalState, WorkerSignal};
use crate::topology::Topology;
use crate::worker::OutputWorker;

#[cfg(test)]
#[path = "publisher_test.rs"]
mod tests;

/// Builder for [`Publisher`]
///
/// # Example
///
/// ```ignore
/// let publisher = Publisher::builder("beacon", &config.output, config.shipper, &registry)
///     .processors(processors)
///     .build()
///     .await?;
/// ```
pub struct PublisherBuilder<'a> {
    agent_name: &'a str,
    outputs: &'a OutputsConfig,
    shipper: ShipperConfig,
    registry: &'a OutputRegistry,
    processors: Processors,
}

impl<'a> PublisherBuilder<'a> {
    /// Processors run on every published event
    #[must_use]
    pub fn processors(mut self, processors: Processors) -> Self {
        self.processors = processors;
        self
    }

    /// Create the outputs and start the publisher
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Fails on any configuration problem (queue capacity out of range, no
    /// outputs, unknown output type, factory failure, topology
    /// misconfiguration), if the host name cannot
    /// be read, or if the initial topology publication fails.
    pub async fn build(self) -> Result<Arc<Publisher>> {
        let shipper = self.shipper;
        beacon_config::validate_shipper(&shipper).inspect_err(|e| {
            tracing::error!(error = %e, "invalid shipper settings");
        })?;
        let dry_run = shipper.dry_run;
        if dry_run {
            tracing::info!("dry run mode, all outputs except the file based ones are disabled");
        }

        let hwm = shipper.queue_capacity();
        let bulk_hwm = shipper.bulk_queue_capacity();
        let geoip_database = resolve_geoip(&shipper.geoip);

        let hostname = net::hostname().map_err(PublisherError::Hostname)?;
        let name = shipper
            .node_name()
            .map_or_else(|| hostname.clone(), str::to_string);
        tracing::info!(name = %name, "publisher name");

        let pipeline_signal = Arc::new(WorkerSignal::new());
        let output_signal = Arc::new(WorkerSignal::new());
        pipeline_signal.init();
        output_signal.init();

        let mut workers = Vec::new();
        let mut loops = Vec::new();
        let mut topology: Option<Topology> = None;

        for (output_name, config) in self.outputs.enabled() {
            let output_type = config.type_name(output_name);

            // unknown types fall through so that create reports them
            if dry_run
                && self
                    .registry
                    .get(output_type)
                    .is_some_and(|factory| !factory.dry_run_exempt())
            {
                tracing::info!(output = %output_name, output_type, "output disabled in dry run mode");
                continue;
            }

            let ctx = OutputContext {
                agent_name: self.agent_name,
                output_name,
                settings: &config.settings,
                topology_expire: shipper.topology_expire,
            };
            let output = self.registry.create(output_type, &ctx).inspect_err(|e| {
                tracing::error!(output = %output_name, error = %e, "failed to create output");
            })?;

            tracing::debug!(output = %output_name, output_type, "create output worker");
            let (worker, worker_loop) = OutputWorker::new(
                output_name.as_str(),
                Arc::clone(&output),
                Arc::clone(&output_signal),
                hwm,
                bulk_hwm,
            );
            workers.push(worker);
            loops.push(worker_loop);

            if !config.save_topology || dry_run {
                continue;
            }

            let candidate = Topology::new(name.clone(), output_name, output).inspect_err(|_| {
                tracing::error!(output = %output_name, "output type does not support topology logging");
            })?;

            if topology.is_some() {
                tracing::error!(
                    "multiple outputs defined to store topology, add save_topology = true only for one output"
                );
                return Err(PublisherError::MultipleTopologyOutputs);
            }

            tracing::info!(output = %output_name, "using output to store the topology");
            topology = Some(candidate);
        }

        if !dry_run {
            if workers.is_empty() {
                tracing::error!("no outputs are defined, please define one under the output section");
                return Err(PublisherError::NoOutputs);
            }
            if topology.is_none() {
                tracing::debug!("no output is defined to store the topology, server fields might not be filled");
            }
        }

        let ip_addrs = report_local_addrs(net::local_ip_addrs());

        let mut tasks = Vec::with_capacity(loops.len() + 1);
        let refresh = CancellationToken::new();

        let topology = topology.map(Arc::new);
        if let Some(topo) = &topology {
            topo.publish(&ip_addrs).await.inspect_err(|e| {
                tracing::error!(error = %e, "failed to publish topology");
            })?;

            let period = shipper.refresh_interval();
            tracing::info!(interval = ?period, "topology map refreshed periodically");
            tasks.push(tokio::spawn(Arc::clone(topo).refresh(period, refresh.clone())));
        }

        tasks.extend(loops.into_iter().map(|worker_loop| tokio::spawn(worker_loop.run())));

        let workers: Arc<[OutputWorker]> = workers.into();
        let beat = BeatInfo {
            name: name.clone(),
            hostname: hostname.clone(),
        };

        tracing::info!(
            outputs = workers.len(),
            hwm,
            bulk_hwm,
            processors = self.processors.len(),
            "publisher started"
        );

        Ok(Arc::new(Publisher {
            shipper_name: shipper.name.clone(),
            hostname,
            name,
            ip_addrs,
            dry_run,
            ignore_outgoing: shipper.ignore_outgoing,
            geoip_database,
            metadata: shipper.metadata,
            beat,
            processors: self.processors,
            async_pipeline: AsyncPipeline::new(Arc::clone(&workers), Arc::clone(&pipeline_signal)),
            sync_pipeline: SyncPipeline::new(Arc::clone(&workers), Arc::clone(&pipeline_signal)),
            workers,
            topology,
            pipeline_signal,
            output_signal,
            clients: AtomicUsize::new(0),
            tasks: Mutex::new(tasks),
            refresh,
        }))
    }
}

/// Process-wide event publisher
pub struct Publisher {
    /// Configured node name (may be empty)
    shipper_name: String,
    /// Host name reported by the operating system
    hostname: String,
    /// Configured name, or the host name
    name: String,
    /// Non-loopback local addresses captured at construction
    ip_addrs: Vec<String>,
    dry_run: bool,
    ignore_outgoing: bool,
    geoip_database: Option<PathBuf>,
    metadata: EventMetadata,
    beat: BeatInfo,
    processors: Processors,

    workers: Arc<[OutputWorker]>,
    topology: Option<Arc<Topology>>,
    async_pipeline: AsyncPipeline,
    sync_pipeline: SyncPipeline,

    pipeline_signal: Arc<WorkerSignal>,
    output_signal: Arc<WorkerSignal>,

    /// Live clients; incremented on connect, decremented (Release) on
    /// disconnect and read (Acquire) by stop, so the last disconnect
    /// happens-before teardown
    clients: AtomicUsize,

    /// Worker loops and the topology refresh task, joined by `stop`
    tasks: Mutex<Vec<JoinHandle<()>>>,
    refresh: CancellationToken,
}

impl Publisher {
    /// Create a publisher with no processors
    ///
    /// See [`PublisherBuilder::build`] for the failure modes.
    pub async fn new(
        agent_name: &str,
        outputs: &OutputsConfig,
        shipper: ShipperConfig,
        registry: &OutputRegistry,
    ) -> Result<Arc<Self>> {
        Self::builder(agent_name, outputs, shipper, registry)
            .build()
            .await
    }

    pub fn builder<'a>(
        agent_name: &'a str,
        outputs: &'a OutputsConfig,
        shipper: ShipperConfig,
        registry: &'a OutputRegistry,
    ) -> PublisherBuilder<'a> {
        PublisherBuilder {
            agent_name,
            outputs,
            shipper,
            registry,
            processors: Processors::default(),
        }
    }

    /// Register a new producer
    ///
    /// The returned client must be dropped (or disconnected) before
    /// [`stop`](Self::stop) is called.
    pub fn connect(self: &Arc<Self>) -> Client {
        self.clients.fetch_add(1, Ordering::AcqRel);
        Client::new(Arc::clone(self))
    }

    pub(crate) fn disconnect(&self) {
        self.clients.fetch_sub(1, Ordering::Release);
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Acquire)
    }

    /// Shut the pipelines and outputs down
    ///
    /// Waits for every worker to exit, then closes every output. Calling it
    /// again is a no-op.
    ///
    /// # Panics
    /// Panics if any client is still connected.
    pub async fn stop(&self) {
        let clients = self.clients.load(Ordering::Acquire);
        if clients > 0 {
            panic!(
                "all clients must disconnect before shutting down publisher pipeline ({clients} still connected)"
            );
        }

        self.pipeline_signal.stop();
        self.refresh.cancel();
        if !self.output_signal.stop() {
            tracing::debug!("publisher already stopped");
            return;
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "publisher task panicked during shutdown");
            }
        }

        for worker in self.workers.iter() {
            if let Err(e) = worker.output().close().await {
                tracing::warn!(output = %worker.name(), error = %e, "failed to close output");
            }
        }

        tracing::info!(name = %self.name, "publisher stopped");
    }

    /// Name of the node owning `ip`
    ///
    /// Loopback addresses resolve to this node. Other addresses are looked up
    /// in the topology store; unknown addresses, lookup failures and invalid
    /// input yield an empty string.
    pub async fn server_name(&self, ip: &str) -> String {
        match net::is_loopback(ip) {
            Ok(true) => return self.name.clone(),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(ip, error = %e, "parsing IP failed");
                return String::new();
            }
        }

        match &self.topology {
            Some(topology) => topology.name_by_ip(ip).await,
            None => String::new(),
        }
    }

    /// Record this node's addresses in the topology store
    ///
    /// With no `ips` the local non-loopback addresses are used. Without a
    /// topology store this is a successful no-op.
    ///
    /// # Errors
    /// Returns `PublisherError::Topology` if the store rejects the update
    pub async fn publish_topology(&self, ips: &[String]) -> Result<()> {
        let Some(topology) = &self.topology else {
            return Ok(());
        };

        if ips.is_empty() {
            topology.publish(&net::local_ip_addrs()).await
        } else {
            topology.publish(ips).await
        }
    }

    /// Check whether `ip` is one of this node's addresses
    pub fn is_publisher_ip(&self, ip: &str) -> bool {
        self.ip_addrs.iter().any(|own| own == ip)
    }

    /// Node name (configured name, else host name)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Configured node name, empty if none
    pub fn shipper_name(&self) -> &str {
        &self.shipper_name
    }

    pub fn ip_addrs(&self) -> &[String] {
        &self.ip_addrs
    }

    /// Whether producers should skip traffic originating from this node
    pub fn ignore_outgoing(&self) -> bool {
        self.ignore_outgoing
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// GeoIP database selected at construction, if any
    pub fn geoip_database(&self) -> Option<&Path> {
        self.geoip_database.as_deref()
    }

    /// Name of the topology-store output, if any
    pub fn topology_output(&self) -> Option<&str> {
        self.topology.as_deref().map(Topology::output_name)
    }

    /// Names of the active outputs, in worker order
    pub fn outputs(&self) -> Vec<&str> {
        self.workers.iter().map(OutputWorker::name).collect()
    }

    /// Per-output worker counters
    pub fn worker_metrics(&self) -> Vec<(String, WorkerMetricsSnapshot)> {
        self.workers
            .iter()
            .map(|w| (w.name().to_string(), w.metrics().snapshot()))
            .collect()
    }

    pub fn pipeline_state(&self) -> SignalState {
        self.pipeline_signal.state()
    }

    pub fn output_state(&self) -> SignalState {
        self.output_signal.state()
    }

    /// Annotate and process the message's events
    ///
    /// Returns `None`, after completing the signaler, if no event survives.
    pub(crate) fn prepare(&self, mut msg: Message) -> Option<Message> {
        let events: Vec<_> = msg
            .take_events()
            .into_iter()
            .filter_map(|mut event| {
                event::annotate(&mut event, &self.beat, &self.metadata);
                self.processors.run(event)
            })
            .collect();

        if events.is_empty() {
            tracing::trace!("all events dropped by processors");
            msg.signal(SignalOutcome::Completed);
            return None;
        }

        msg.replace_events(events);
        Some(msg)
    }

    /// Pipeline serving `msg`
    pub(crate) fn pipeline_for(&self, msg: &Message) -> &dyn Pipeline {
        if msg.wants_sync() {
            &self.sync_pipeline
        } else {
            &self.async_pipeline
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        // workers and the refresh task must not outlive the publisher
        self.pipeline_signal.stop();
        self.refresh.cancel();
        self.output_signal.stop();
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("outputs", &self.outputs())
            .field("topology_output", &self.topology_output())
            .field("dry_run", &self.dry_run)
            .field("clients", &self.client_count())
            .finish()
    }
}

/// Log the discovered local addresses and hand them back
fn report_local_addrs(ip_addrs: Vec<String>) -> Vec<String> {
    if ip_addrs.is_empty() {
        tracing::warn!("no non-loopback local addresses found, topology will carry no addresses");
    } else {
        tracing::debug!(ips = ?ip_addrs, "local addresses");
    }
    ip_addrs
}

/// First configured GeoIP database that exists
fn resolve_geoip(config: &GeoipConfig) -> Option<PathBuf> {
    if config.paths.is_empty() {
        tracing::info!("GeoIP disabled: no paths were set under geoip.paths");
        return None;
    }

    let found = config
        .paths
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .find(|p| p.is_file());

    match &found {
        Some(path) => tracing::info!(path = %path.display(), "loaded GeoIP database"),
        None => tracing::warn!(paths = ?config.paths, "could not find a GeoIP database, geo enrichment disabled"),
    }
    found
}
