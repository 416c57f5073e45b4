//! Error types for the collection store.

/// Errors that can occur while reading or mutating collections.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be checked out.
    #[error("store connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The connection pool could not be built.
    #[error("store pool initialization error: {0}")]
    PoolInit(#[from] flux_db::PoolError),

    /// Preparing the database schema failed.
    #[error("store migration error: {0}")]
    Migration(#[from] flux_db::MigrationError),

    /// A writer panicked while holding the collection lock.
    #[error("collection store lock poisoned")]
    LockPoisoned,

    /// A persisted row holds a value the store cannot interpret.
    #[error("corrupt collection row: {0}")]
    Corrupt(String),
}
