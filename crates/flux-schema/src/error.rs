//! Error types for the schema registry.

use flux_types::SchemaError;

/// Errors that can occur while registering or loading schemas.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The submitted document failed validation; nothing was stored.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// No schema is registered under this ID.
    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    /// A database operation failed.
    #[error("registry database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be checked out.
    #[error("registry connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The connection pool could not be built.
    #[error("registry pool initialization error: {0}")]
    PoolInit(#[from] flux_db::PoolError),

    /// Preparing the database schema failed.
    #[error("registry migration error: {0}")]
    Migration(#[from] flux_db::MigrationError),

    /// A stored document could not be encoded or decoded.
    #[error("registry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A writer panicked while holding the registry lock.
    #[error("schema registry lock poisoned")]
    LockPoisoned,

    /// A persisted row holds a value the registry cannot interpret.
    #[error("corrupt schema row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl RegistryError {
    /// Stable error class label surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSchema(_) => "invalid_schema",
            Self::SchemaNotFound(_) => "unknown_schema",
            _ => "store",
        }
    }
}
