//! Database layer for Flux.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations for the durable schema registry and
//! collection store. The in-memory backends never touch this crate.
//!
//! # Layout
//!
//! - `schemas`: schema documents keyed by schema ID.
//! - `collections`: one row per storage key with its collection kind.
//! - `collection_members`: `(storage_key, member, score, seq)` rows.
//! - `counters`: the process-wide score counter and insertion sequence.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH};
