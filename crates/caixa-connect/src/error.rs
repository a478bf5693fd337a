use std::path::PathBuf;

use uuid::Uuid;

use caixa_core::WriteError;

/// Errors from a concrete connector implementation.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid connector configuration: {0}")]
    Config(String),

    #[error("destination rejected write: {0}")]
    Rejected(String),
}

/// Errors loading or validating a route configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse route config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid route config: {0}")]
    Invalid(String),
}

/// Errors of a source run. A storage failure partway through leaves the
/// already-debatched messages persisted; `persisted` names them all.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("source run stopped after {} messages: {source}", .persisted.len())]
    Write {
        /// Every id persisted across all chunks before the failure.
        persisted: Vec<Uuid>,
        #[source]
        source: WriteError,
    },
}

/// Errors of a transport run (resolution, structure setup, produce, consume).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("sink {subscriber} failed: {source}")]
    Sink {
        subscriber: String,
        #[source]
        source: caixa_core::ConsumeError,
    },

    #[error("sink {subscriber} panicked")]
    SinkPanicked { subscriber: String },

    #[error(transparent)]
    Storage(#[from] caixa_core::StorageError),
}
