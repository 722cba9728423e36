//! Console Output - Events as JSON lines on stdout
//!
//! Debug output; not meant for high throughput.
//!
//! # Example Output
//!
//! ```text
//! {"@timestamp":"2025-01-15T10:30:45.123Z","beat":{"hostname":"edge-01","name":"edge-01"},"message":"started"}
//! ```
//!
//! With `pretty = true` each event is printed as indented JSON instead.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use beacon_publisher::{Event, Message, Output, OutputContext, OutputError, OutputFactory};
use parking_lot::Mutex;
use serde::Deserialize;

#[cfg(test)]
#[path = "console_test.rs"]
mod tests;

/// Settings for the console output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Indent every event
    pub pretty: bool,
}

impl ConsoleConfig {
    /// Config with pretty printing enabled
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

/// Console output metrics
#[derive(Debug, Default)]
pub struct ConsoleMetrics {
    events_written: AtomicU64,
    bytes_written: AtomicU64,
}

impl ConsoleMetrics {
    #[inline]
    fn record(&self, events: u64, bytes: u64) {
        self.events_written.fetch_add(events, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

/// Writes every event to a line-oriented writer (stdout by default)
pub struct ConsoleOutput {
    config: ConsoleConfig,
    writer: Mutex<Box<dyn Write + Send>>,
    metrics: ConsoleMetrics,
}

impl ConsoleOutput {
    /// Console output on stdout
    pub fn new(config: ConsoleConfig) -> Self {
        Self::with_writer(config, io::stdout())
    }

    /// Console output on an arbitrary writer
    pub fn with_writer(config: ConsoleConfig, writer: impl Write + Send + 'static) -> Self {
        Self {
            config,
            writer: Mutex::new(Box::new(writer)),
            metrics: ConsoleMetrics::default(),
        }
    }

    #[inline]
    pub fn metrics(&self) -> &ConsoleMetrics {
        &self.metrics
    }

    fn encode(&self, event: &Event, buf: &mut Vec<u8>) -> Result<(), OutputError> {
        if self.config.pretty {
            serde_json::to_writer_pretty(&mut *buf, event)?;
        } else {
            serde_json::to_writer(&mut *buf, event)?;
        }
        buf.push(b'\n');
        Ok(())
    }
}

#[async_trait]
impl Output for ConsoleOutput {
    async fn send(&self, batch: &[Message]) -> Result<(), OutputError> {
        let mut buf = Vec::new();
        let mut events = 0u64;
        for event in batch.iter().flat_map(Message::events) {
            self.encode(event, &mut buf)?;
            events += 1;
        }

        let mut writer = self.writer.lock();
        writer.write_all(&buf)?;
        writer.flush()?;
        drop(writer);

        self.metrics.record(events, buf.len() as u64);
        Ok(())
    }

    async fn close(&self) -> Result<(), OutputError> {
        self.writer.lock().flush()?;
        tracing::debug!(events = self.metrics.events_written(), "console output closed");
        Ok(())
    }
}

/// Factory for `type = "console"`
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleFactory;

impl OutputFactory for ConsoleFactory {
    fn create(&self, ctx: &OutputContext<'_>) -> Result<Arc<dyn Output>, OutputError> {
        let config: ConsoleConfig = ctx.settings()?;
        tracing::info!(output = %ctx.output_name, pretty = config.pretty, "console output created");
        Ok(Arc::new(ConsoleOutput::new(config)))
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
