//! SQLite-backed collection store.
//!
//! Members live in `collection_members`, ranked by the
//! `(storage_key, score DESC, seq ASC)` index. The score counter and the
//! insertion sequence live in `counters` so they survive restarts and
//! never move backwards.

use flux_db::{DbPool, DbRuntimeSettings};
use flux_types::{CollectionKind, Mutation, MutationOp, Score, ScoredMember, StorageKey};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::{ApplyOutcome, CollectionStore, StoreError};

/// Collection store persisted in SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Wraps a pool whose database has already been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens (or creates) a database at `path` and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the pool cannot be built or migrations fail.
    pub fn open(path: &str, settings: DbRuntimeSettings) -> Result<Self, StoreError> {
        let pool = flux_db::create_pool(path, settings)?;
        {
            let conn = pool.get()?;
            let applied = flux_db::run_migrations(&conn)?;
            if applied > 0 {
                tracing::info!(count = applied, path, "applied collection store migrations");
            }
        }
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn bump_counter(conn: &Connection, name: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "UPDATE counters SET value = value + 1 WHERE name = ?1 RETURNING value",
        [name],
        |row| row.get(0),
    )
}

fn collection_kind(
    conn: &Connection,
    key: &StorageKey,
) -> Result<Option<CollectionKind>, StoreError> {
    let kind: Option<String> = conn
        .query_row(
            "SELECT kind FROM collections WHERE storage_key = ?1",
            [key.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    kind.map(|kind| {
        kind.parse::<CollectionKind>()
            .map_err(|e| StoreError::Corrupt(format!("{key}: {e}")))
    })
    .transpose()
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl CollectionStore for SqliteStore {
    fn next_score(&self) -> Result<Score, StoreError> {
        let conn = self.pool.get()?;
        let value = bump_counter(&conn, "score")?;
        Ok(value as Score)
    }

    fn apply(&self, mutations: &[Mutation]) -> Result<ApplyOutcome, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut outcome = ApplyOutcome::default();
        for mutation in mutations {
            let key = mutation.key.as_str();
            match mutation.op {
                MutationOp::Add => {
                    tx.execute(
                        "INSERT OR IGNORE INTO collections (storage_key, kind) VALUES (?1, ?2)",
                        params![key, mutation.kind.as_str()],
                    )?;
                    let exists: bool = tx.query_row(
                        "SELECT EXISTS(
                            SELECT 1 FROM collection_members
                            WHERE storage_key = ?1 AND member = ?2
                         )",
                        params![key, mutation.member],
                        |row| row.get(0),
                    )?;
                    if exists {
                        outcome.unchanged += 1;
                        continue;
                    }
                    let seq = bump_counter(&tx, "insertion")?;
                    tx.execute(
                        "INSERT INTO collection_members (storage_key, member, score, seq)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![key, mutation.member, mutation.score, seq],
                    )?;
                    tracing::trace!(storage_key = key, member = %mutation.member, seq, "inserted member");
                    outcome.added += 1;
                }
                MutationOp::Remove => {
                    let deleted = tx.execute(
                        "DELETE FROM collection_members WHERE storage_key = ?1 AND member = ?2",
                        params![key, mutation.member],
                    )?;
                    if deleted > 0 {
                        outcome.removed += 1;
                    } else {
                        outcome.unchanged += 1;
                    }
                }
            }
        }

        tx.commit()?;
        tracing::trace!(
            added = outcome.added,
            removed = outcome.removed,
            unchanged = outcome.unchanged,
            "applied mutations to sqlite store"
        );
        Ok(outcome)
    }

    fn range(&self, key: &StorageKey, limit: usize) -> Result<Vec<ScoredMember>, StoreError> {
        let conn = self.pool.get()?;
        let Some(kind) = collection_kind(&conn, key)? else {
            return Ok(Vec::new());
        };

        let sql = match kind {
            CollectionKind::Ordered => {
                "SELECT member, score FROM collection_members
                 WHERE storage_key = ?1
                 ORDER BY score DESC, seq ASC
                 LIMIT ?2"
            }
            CollectionKind::Set => {
                "SELECT member, score FROM collection_members
                 WHERE storage_key = ?1
                 ORDER BY member ASC
                 LIMIT ?2"
            }
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![key.as_str(), sql_limit(limit)], |row| {
            Ok(ScoredMember {
                member: row.get(0)?,
                score: row.get(1)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    fn contains(&self, key: &StorageKey, member: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let exists = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM collection_members WHERE storage_key = ?1 AND member = ?2
             )",
            params![key.as_str(), member],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn len(&self, key: &StorageKey) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM collection_members WHERE storage_key = ?1",
            [key.as_str()],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|_| StoreError::Corrupt(format!("{key}: negative count")))
    }
}
