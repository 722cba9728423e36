//! Beacon - Outputs
//!
//! Built-in delivery backends for the publisher.
//!
//! # Architecture
//!
//! Each output is driven by one publisher-owned worker task, which calls
//! `send` with one message or a coalesced group of messages.
//!
//! ```text
//! [OutputWorker] --&[Message]--> [Output::send] --> [Destination]
//! ```
//!
//! # Available Outputs
//!
//! | Type | Purpose | Topology store | Dry run |
//! |------|---------|----------------|---------|
//! | `console` | JSON lines on stdout | No | Disabled |
//! | `file` | JSON lines with size rotation | No | Enabled |
//! | `memory` | In-process buffer | Yes | Disabled |
//!
//! # Example
//!
//! ```ignore
//! use beacon_outputs::default_registry;
//! use beacon_publisher::Publisher;
//!
//! let registry = default_registry();
//! let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry).await?;
//! ```

use beacon_publisher::OutputRegistry;

/// Console output - JSON lines on stdout
pub mod console;

/// File output - JSON lines with size-based rotation
pub mod file;

/// Memory output - in-process buffer and topology store
pub mod memory;

pub use console::{ConsoleConfig, ConsoleFactory, ConsoleOutput};
pub use file::{FileConfig, FileFactory, FileOutput};
pub use memory::{MemoryConfig, MemoryFactory, MemoryOutput, MemoryStore};

/// Registry holding every built-in output type
pub fn default_registry() -> OutputRegistry {
    let mut registry = OutputRegistry::new();
    registry.register("console", ConsoleFactory);
    registry.register("file", FileFactory);
    registry.register("memory", MemoryFactory::new());
    registry
}
