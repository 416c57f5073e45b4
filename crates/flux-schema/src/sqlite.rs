//! SQLite-backed schema registry.
//!
//! Documents are stored as JSON in the `schemas` table and re-validated on
//! load. Loaded schemas are cached since they never change.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use flux_db::{DbPool, DbRuntimeSettings};
use flux_types::Schema;
use rusqlite::{params, OptionalExtension};

use crate::{RegistryError, SchemaRecord, SchemaRegistry, SchemaSummary};

/// Schema registry persisted in SQLite.
pub struct SqliteSchemaRegistry {
    pool: DbPool,
    cache: RwLock<HashMap<String, SchemaRecord>>,
}

impl SqliteSchemaRegistry {
    /// Wraps a pool whose database has already been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Opens (or creates) a database at `path` and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if the pool cannot be built or migrations fail.
    pub fn open(path: &str, settings: DbRuntimeSettings) -> Result<Self, RegistryError> {
        let pool = flux_db::create_pool(path, settings)?;
        {
            let conn = pool.get()?;
            flux_db::run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    fn cached(&self, id: &str) -> Result<Option<SchemaRecord>, RegistryError> {
        let cache = self.cache.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(cache.get(id).cloned())
    }

    fn remember(&self, record: &SchemaRecord) -> Result<(), RegistryError> {
        let mut cache = self.cache.write().map_err(|_| RegistryError::LockPoisoned)?;
        cache.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>, RegistryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RegistryError::Corrupt {
            id: id.to_string(),
            reason: format!("bad registered_at `{raw}`: {e}"),
        })
}

impl SchemaRegistry for SqliteSchemaRegistry {
    fn register(&self, schema: Schema) -> Result<SchemaRecord, RegistryError> {
        let record = SchemaRecord::new(schema);
        let document_json = serde_json::to_string(&record.schema.to_document())?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO schemas (schema_id, document_json, registered_at) VALUES (?1, ?2, ?3)",
            params![record.id, document_json, record.registered_at.to_rfc3339()],
        )?;
        drop(conn);

        self.remember(&record)?;
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<SchemaRecord, RegistryError> {
        if let Some(record) = self.cached(id)? {
            return Ok(record);
        }

        let conn = self.pool.get()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT document_json, registered_at FROM schemas WHERE schema_id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        drop(conn);

        let (document_json, registered_at) =
            row.ok_or_else(|| RegistryError::SchemaNotFound(id.to_string()))?;
        let document: serde_json::Value = serde_json::from_str(&document_json)?;
        let schema = Schema::from_document(&document).map_err(|e| RegistryError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let record = SchemaRecord {
            id: id.to_string(),
            registered_at: parse_timestamp(id, &registered_at)?,
            schema: Arc::new(schema),
        };
        self.remember(&record)?;
        tracing::debug!(schema_id = id, "loaded schema from database");
        Ok(record)
    }

    fn list(&self) -> Result<Vec<SchemaSummary>, RegistryError> {
        let ids: Vec<String> = {
            let conn = self.pool.get()?;
            let mut stmt =
                conn.prepare("SELECT schema_id FROM schemas ORDER BY registered_at, schema_id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            let ids = rows.collect::<Result<Vec<String>, _>>()?;
            ids
        };
        ids.iter()
            .map(|id| self.get(id).map(|record| record.summary()))
            .collect()
    }
}
