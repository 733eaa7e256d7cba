//! Error types shared by the collector, store and controller.

/// Errors produced by the collection and reconciliation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Listing a resource from the cluster failed.
    #[error("failed to fetch {resource} from the cluster: {message}")]
    ProviderFetch {
        resource: &'static str,
        message: String,
    },

    #[error("key already exists: {0}")]
    DuplicateKey(String),

    #[error("failed to serialize {field}: {source}")]
    Serialization {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to deserialize {field}: {source}")]
    Deserialization {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported filter: {0}")]
    InvalidFilter(String),

    #[error("{kind} {name} could not be found")]
    NotFound { kind: &'static str, name: String },

    #[error("unsupported workload type: {0}")]
    UnknownWorkloadType(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("controller already started")]
    AlreadyStarted,

    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    pub(crate) fn provider(resource: &'static str, err: impl std::fmt::Display) -> Self {
        Error::ProviderFetch {
            resource,
            message: err.to_string(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
