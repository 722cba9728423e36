//! Beacon Configuration
//!
//! TOML-based configuration types with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! Reading the document from disk is left to the assembling process; this crate
//! only parses and validates.
//!
//! # Parsing
//!
//! ```
//! use beacon_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[output.console]").unwrap();
//! assert!(config.output.contains("console"));
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [shipper]
//! name = "edge-01"
//! queue_size = 1000
//!
//! [output.memory]
//! save_topology = true
//!
//! [output.archive]
//! type = "file"
//! path = "/var/log/beacon"
//! ```

mod error;
mod logging;
mod outputs;
mod shipper;
mod validation;

use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use outputs::{OutputConfig, OutputsConfig};
pub use shipper::{
    DEFAULT_BULK_QUEUE_SIZE, DEFAULT_QUEUE_SIZE, DEFAULT_REFRESH_TOPOLOGY_FREQ,
    DEFAULT_TOPOLOGY_EXPIRE, EventMetadata, GeoipConfig, ShipperConfig,
};
pub use validation::{MAX_QUEUE_SIZE, validate_shipper};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Diagnostic logging
    pub log: LogConfig,

    /// Publisher-level settings
    pub shipper: ShipperConfig,

    /// Named outputs (backend name -> settings)
    pub output: OutputsConfig,
}

impl Config {
    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Get list of enabled output names
    pub fn enabled_outputs(&self) -> Vec<String> {
        self.output.enabled().map(|(name, _)| name.clone()).collect()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
