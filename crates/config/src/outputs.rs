//! Output configuration types
//!
//! Outputs are named instances, allowing multiple outputs of the same type
//! (e.g. two file outputs writing to different directories). Everything that is
//! not a common key is kept as backend-specific settings and interpreted by the
//! output's factory.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Container for all output configurations
///
/// Outputs are stored as a sorted map of name -> config so that outputs are
/// always created in the same order.
///
/// # Example
///
/// ```toml
/// [output.console]
/// pretty = true
///
/// [output.archive]
/// type = "file"
/// path = "/var/log/beacon"
///
/// [output.memory]
/// save_topology = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    /// Named output instances
    #[serde(flatten)]
    outputs: BTreeMap<String, OutputConfig>,
}

impl OutputsConfig {
    /// Create an empty output map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a named output
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, config: OutputConfig) -> Self {
        self.outputs.insert(name.into(), config);
        self
    }

    /// Get an output by name
    pub fn get(&self, name: &str) -> Option<&OutputConfig> {
        self.outputs.get(name)
    }

    /// Check if an output exists
    pub fn contains(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Iterate over all outputs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &OutputConfig)> {
        self.outputs.iter()
    }

    /// Iterate over enabled outputs in name order
    pub fn enabled(&self) -> impl Iterator<Item = (&String, &OutputConfig)> {
        self.outputs.iter().filter(|(_, output)| output.enabled)
    }

    /// Get the number of configured outputs
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Check if no outputs are configured
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Configuration for a single output instance
///
/// The output type is taken from the section name unless `type` is given.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output type as registered in the output registry
    #[serde(rename = "type")]
    pub output_type: Option<String>,

    /// Whether this output is enabled
    /// Default: true
    pub enabled: bool,

    /// Whether this output stores the node topology.
    /// At most one output may set this.
    /// Default: false
    pub save_topology: bool,

    /// Backend-specific settings
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_type: None,
            enabled: true,
            save_topology: false,
            settings: toml::Table::new(),
        }
    }
}

impl OutputConfig {
    /// Create an enabled output of the given type with no settings
    pub fn of_type(output_type: impl Into<String>) -> Self {
        Self {
            output_type: Some(output_type.into()),
            ..Self::default()
        }
    }

    /// Mark this output as the topology store
    #[must_use]
    pub fn with_save_topology(mut self) -> Self {
        self.save_topology = true;
        self
    }

    /// Add a backend-specific setting
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Resolve the output type, falling back to the section name
    pub fn type_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.output_type.as_deref().unwrap_or(name)
    }
}
