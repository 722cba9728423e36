//! Beacon - Publisher
//!
//! The in-process pipeline that takes events from producers and hands them to
//! every configured output.
//!
//! # Architecture
//!
//! ```text
//! [Producers]          [Publisher]                           [Outputs]
//!   Client ──┐                            ┌─→ OutputWorker ──→ console
//!   Client ──┼──→ annotate ──→ Pipeline ──┼─→ OutputWorker ──→ file
//!   Client ──┘    processors   sync/async └─→ OutputWorker ──→ memory (topology)
//!                                                  ▲
//!                              Topology refresh ───┘
//! ```
//!
//! # Key Design
//!
//! - **Bounded queues**: each worker owns a message queue (`hwm`) and an
//!   optional batch queue (`bulk_hwm`); a full queue blocks the producer
//! - **Exactly-once signals**: a message's signaler is split across outputs
//!   and fires once with the combined outcome
//! - **Ordered shutdown**: the pipeline-side [`WorkerSignal`] stops before the
//!   output-side one, so nothing is enqueued on an exited worker
//! - **Client counting**: [`Publisher::stop`] panics while clients are connected
//!
//! # Example
//!
//! ```ignore
//! use beacon_publisher::{Event, Message, Publisher};
//!
//! let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry).await?;
//! let client = publisher.connect();
//!
//! client.publish_event(Event::new().with("message", "hello")).await;
//! client.publish(Message::event(event).guaranteed()).await;
//!
//! client.disconnect();
//! publisher.stop().await;
//! ```

mod client;
mod error;
mod event;
pub mod logging;
mod message;
mod metrics;
pub mod net;
mod output;
mod pipeline;
mod processor;
mod publisher;
mod registry;
mod signal;
mod topology;
mod worker;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use error::{PublisherError, Result, WorkerError};
pub use event::{BEAT_FIELD, BeatInfo, Event, FIELDS_FIELD, TAGS_FIELD, TIMESTAMP_FIELD, annotate};
pub use message::{
    CallbackSignal, Message, SignalChannel, SignalOutcome, SignalReceiver, Signaler, SplitSignal,
    notify,
};
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
pub use output::{Output, OutputError, TopologyStore};
pub use pipeline::{AsyncPipeline, Pipeline, SyncPipeline};
pub use processor::{DropEvent, DropFields, IncludeFields, Processor, Processors};
pub use publisher::{Publisher, PublisherBuilder};
pub use registry::{OutputContext, OutputFactory, OutputRegistry};
pub use signal::{SignalState, WorkerSignal};
pub use worker::{OutputWorker, WorkerLoop};

// Re-export the configuration types the public API takes
pub use beacon_config::{EventMetadata, OutputConfig, OutputsConfig, ShipperConfig};
