//! Error types for event fan-out and queries.

use flux_schema::RegistryError;
use flux_store::StoreError;
use flux_types::EventError;

/// Errors raised while processing a batch or a single event.
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// The batch names a schema ID that was never registered.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// The event is malformed or references missing attributes.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Reading or writing collections failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Loading the schema failed for a reason other than an unknown ID.
    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for FanoutError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::SchemaNotFound(id) => Self::UnknownSchema(id),
            other => Self::Registry(other),
        }
    }
}

impl FanoutError {
    /// Stable error class label surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownSchema(_) => "unknown_schema",
            Self::Event(e) => e.kind(),
            Self::Store(_) => "store",
            Self::Registry(e) => e.kind(),
        }
    }
}

/// Errors raised by the query service.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query requires at least one key")]
    NoKeys,

    #[error("max_results must be positive")]
    InvalidMaxResults,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoKeys | Self::InvalidMaxResults => "invalid_query",
            Self::Store(_) => "store",
        }
    }
}
