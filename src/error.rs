//! Error types for dispatch, training, and persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for haulq operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed configuration file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Tick dataset contains no numeric tick keys")]
    EmptyDataset,

    #[error("Tick not found: {0}")]
    TickNotFound(String),

    #[error("Truck not present in tick: {0}")]
    TruckNotFound(String),

    #[error("No valid actions for truck {0}")]
    NoValidActions(String),

    #[error("Malformed record for truck {truck_id}: {reason}")]
    MalformedTruck { truck_id: String, reason: String },
}

impl DispatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DispatchError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        DispatchError::Json {
            context: context.into(),
            source,
        }
    }
}
