//! Output Registry - explicit backend registration
//!
//! The registry maps output type names to factories. The assembling process
//! populates it with explicit `register` calls at startup and hands it to
//! [`Publisher`](crate::Publisher) construction.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = OutputRegistry::new();
//! registry.register("console", ConsoleFactory);
//! registry.register("file", FileFactory);
//!
//! let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry).await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{PublisherError, Result};
use crate::output::{Output, OutputError};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Everything a factory may need to build one output
#[derive(Debug, Clone, Copy)]
pub struct OutputContext<'a> {
    /// Name of the agent publishing (e.g. used as default file name)
    pub agent_name: &'a str,

    /// Name of the output section
    pub output_name: &'a str,

    /// Backend-specific settings from the output section
    pub settings: &'a toml::Table,

    /// Lifetime of topology entries, for backends acting as topology store
    pub topology_expire: Duration,
}

impl OutputContext<'_> {
    /// Deserialize the backend settings into a typed struct
    ///
    /// # Errors
    /// Returns `OutputError::Config` if the settings do not match `T`
    pub fn settings<T: DeserializeOwned>(&self) -> std::result::Result<T, OutputError> {
        toml::Value::Table(self.settings.clone())
            .try_into()
            .map_err(|e: toml::de::Error| {
                OutputError::config(format!("output '{}': {}", self.output_name, e))
            })
    }
}

/// Factory trait for creating outputs
pub trait OutputFactory: Send + Sync {
    /// Create an output instance
    ///
    /// # Errors
    /// Returns `OutputError` if settings are invalid or the backend cannot start
    fn create(&self, ctx: &OutputContext<'_>) -> std::result::Result<Arc<dyn Output>, OutputError>;

    /// Human-readable name for this factory (for logs)
    fn name(&self) -> &'static str;

    /// Whether this output stays active in dry-run mode
    fn dry_run_exempt(&self) -> bool {
        false
    }
}

/// Registry for output factories
pub struct OutputRegistry {
    factories: BTreeMap<String, Box<dyn OutputFactory>>,
}

impl OutputRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register an output factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    /// Use `try_register` for fallible registration.
    pub fn register<F: OutputFactory + 'static>(&mut self, type_name: &str, factory: F) {
        if self.factories.contains_key(type_name) {
            panic!("Output factory '{}' already registered", type_name);
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    /// Try to register an output factory
    ///
    /// Returns `false` if a factory is already registered with this name.
    pub fn try_register<F: OutputFactory + 'static>(&mut self, type_name: &str, factory: F) -> bool {
        if self.factories.contains_key(type_name) {
            return false;
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
        true
    }

    /// Look up a factory by type name
    pub fn get(&self, type_name: &str) -> Option<&dyn OutputFactory> {
        self.factories.get(type_name).map(|f| f.as_ref())
    }

    /// Create an output from its type name
    ///
    /// # Errors
    /// - `PublisherError::UnknownOutputType` if the type is not registered
    /// - `PublisherError::OutputInit` if the factory fails
    pub fn create(&self, type_name: &str, ctx: &OutputContext<'_>) -> Result<Arc<dyn Output>> {
        let factory = self
            .get(type_name)
            .ok_or_else(|| PublisherError::UnknownOutputType {
                output: ctx.output_name.to_string(),
                output_type: type_name.to_string(),
                available: self.available_types().join(", "),
            })?;

        factory
            .create(ctx)
            .map_err(|e| PublisherError::output_init(ctx.output_name, e))
    }

    /// Check if an output type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered output types, sorted
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}
