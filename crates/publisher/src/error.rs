//! Publisher error types
//!
//! Construction errors are fatal: the publisher is never returned and the
//! caller is expected to abort startup. Runtime failures are surfaced through
//! signalers and logs instead.

use thiserror::Error;

use crate::output::OutputError;

/// Publisher errors
#[derive(Debug, Error)]
pub enum PublisherError {
    /// The shipper settings are out of range
    #[error(transparent)]
    Config(#[from] beacon_config::ConfigError),

    /// No output was configured and the publisher is not in dry-run mode
    #[error("no outputs are defined, please define one under the output section")]
    NoOutputs,

    /// More than one output asked to store the topology
    #[error("multiple outputs defined to store topology, set save_topology only for one output")]
    MultipleTopologyOutputs,

    /// An output asked to store the topology but has no topology capability
    #[error("output '{output}' does not support topology storage")]
    TopologyNotSupported {
        /// Name of the output
        output: String,
    },

    /// The output type is not present in the registry
    #[error("output '{output}' has unknown type '{output_type}', available: [{available}]")]
    UnknownOutputType {
        /// Name of the output
        output: String,
        /// Requested type
        output_type: String,
        /// Comma-separated list of registered types
        available: String,
    },

    /// The output factory failed
    #[error("failed to initialize output '{output}': {source}")]
    OutputInit {
        /// Name of the output
        output: String,
        /// Factory error
        #[source]
        source: OutputError,
    },

    /// The local host name could not be determined
    #[error("failed to resolve host name: {0}")]
    Hostname(#[source] std::io::Error),

    /// The topology store rejected an update
    #[error("failed to publish topology: {0}")]
    Topology(#[source] OutputError),
}

impl PublisherError {
    /// Create a TopologyNotSupported error
    pub fn topology_not_supported(output: impl Into<String>) -> Self {
        Self::TopologyNotSupported {
            output: output.into(),
        }
    }

    /// Create an OutputInit error
    pub fn output_init(output: impl Into<String>, source: OutputError) -> Self {
        Self::OutputInit {
            output: output.into(),
            source,
        }
    }
}

/// Result type for publisher operations
pub type Result<T> = std::result::Result<T, PublisherError>;

/// Errors returned when a message cannot be handed to an output worker
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum WorkerError {
    /// The queue is at capacity (backpressure)
    #[error("output queue full")]
    Full,

    /// The worker's shutdown signal has stopped
    #[error("output worker stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PublisherError::NoOutputs;
        assert!(err.to_string().contains("no outputs are defined"));

        let err = PublisherError::MultipleTopologyOutputs;
        assert!(err.to_string().contains("multiple outputs defined to store topology"));

        let err = PublisherError::topology_not_supported("console");
        assert!(err.to_string().contains("'console'"));

        let err = PublisherError::UnknownOutputType {
            output: "es".into(),
            output_type: "elasticsearch".into(),
            available: "console, file".into(),
        };
        assert!(err.to_string().contains("unknown type 'elasticsearch'"));
        assert!(err.to_string().contains("console, file"));

        let err = PublisherError::output_init("local", OutputError::config("missing path"));
        assert!(err.to_string().contains("local"));
        assert!(err.to_string().contains("missing path"));
    }

    #[test]
    fn test_worker_error_display() {
        assert_eq!(WorkerError::Full.to_string(), "output queue full");
        assert_eq!(WorkerError::Stopped.to_string(), "output worker stopped");
    }
}
