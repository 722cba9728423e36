//! Configuration validation
//!
//! Validates config consistency:
//! - Output types are not blank
//! - Batch queue does not exceed what a single backend call can sensibly take
//!
//! Topology-store exclusivity is checked by the publisher at construction time,
//! since it depends on which outputs actually get created.

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::shipper::ShipperConfig;

/// Largest accepted queue capacity for either queue
pub const MAX_QUEUE_SIZE: usize = 1 << 24;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_shipper(&config.shipper)?;
    validate_outputs(config)?;
    Ok(())
}

/// Validate queue capacities
///
/// Also run by the publisher, since a `ShipperConfig` can be built without
/// going through [`Config::from_str`](std::str::FromStr::from_str).
pub fn validate_shipper(shipper: &ShipperConfig) -> Result<()> {
    if shipper.queue_capacity() > MAX_QUEUE_SIZE {
        return Err(ConfigError::invalid_value(
            "shipper",
            "shipper",
            "queue_size",
            format!("must not exceed {MAX_QUEUE_SIZE}"),
        ));
    }

    if shipper.bulk_queue_capacity() > MAX_QUEUE_SIZE {
        return Err(ConfigError::invalid_value(
            "shipper",
            "shipper",
            "bulk_queue_size",
            format!("must not exceed {MAX_QUEUE_SIZE}"),
        ));
    }

    Ok(())
}

fn validate_outputs(config: &Config) -> Result<()> {
    for (name, output) in config.output.iter() {
        if output.type_name(name).trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "output",
                name,
                "type",
                "must not be empty",
            ));
        }
    }
    Ok(())
}
