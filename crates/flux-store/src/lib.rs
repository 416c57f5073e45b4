//! Collection store for Flux.
//!
//! A collection is a keyed container of unique members, each carrying a
//! score. Every key names one collection (`<entityId>:<relation>`) and is
//! created lazily by the first add that targets it.
//!
//! Two backends implement [`CollectionStore`]:
//!
//! | Backend | Locking | Durability |
//! |---------|---------|------------|
//! | [`MemoryStore`] | one `RwLock` over all collections | process lifetime |
//! | [`SqliteStore`] | one `IMMEDIATE` transaction per `apply` | SQLite file |
//!
//! Both apply every mutation of one [`CollectionStore::apply`] call
//! atomically, and both own the process-wide score counter.

mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use flux_types::{Mutation, Score, ScoredMember, StorageKey};

/// What one [`CollectionStore::apply`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Members newly inserted.
    pub added: usize,
    /// Members deleted.
    pub removed: usize,
    /// Adds of existing members and removes of absent ones.
    pub unchanged: usize,
}

/// Keyed storage for member collections.
///
/// Adds are first-insertion-wins: re-adding a member never changes its
/// score or position. Removing a non-member is a no-op. Reading a key with
/// no collection yields nothing rather than an error.
pub trait CollectionStore: Send + Sync {
    /// Advances the process-wide score counter and returns the new value.
    ///
    /// Values are strictly increasing for the lifetime of the store.
    fn next_score(&self) -> Result<Score, StoreError>;

    /// Applies every mutation atomically with respect to readers.
    fn apply(&self, mutations: &[Mutation]) -> Result<ApplyOutcome, StoreError>;

    /// Top `limit` members of a collection.
    ///
    /// Ordered collections rank by score descending, ties by insertion
    /// order. Set collections return members lexicographically.
    fn range(&self, key: &StorageKey, limit: usize) -> Result<Vec<ScoredMember>, StoreError>;

    /// Whether `member` belongs to the collection at `key`.
    fn contains(&self, key: &StorageKey, member: &str) -> Result<bool, StoreError>;

    /// Number of members at `key`.
    fn len(&self, key: &StorageKey) -> Result<usize, StoreError>;

    /// Every member of a collection, in [`range`](Self::range) order.
    fn members(&self, key: &StorageKey) -> Result<Vec<String>, StoreError> {
        Ok(self
            .range(key, usize::MAX)?
            .into_iter()
            .map(|scored| scored.member)
            .collect())
    }
}
