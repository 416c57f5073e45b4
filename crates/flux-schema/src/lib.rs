//! Schema registry and rule matching for Flux.
//!
//! Schemas are validated once at registration, assigned a UUID, and never
//! change afterwards. The fan-out engine looks them up by ID for every
//! submitted batch and asks [`match_rules`] which rules an event triggers.

mod error;
mod matcher;
mod memory;
mod sqlite;

pub use error::RegistryError;
pub use matcher::match_rules;
pub use memory::MemorySchemaRegistry;
pub use sqlite::SqliteSchemaRegistry;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use flux_types::Schema;
use serde::Serialize;

/// A registered schema.
#[derive(Debug, Clone)]
pub struct SchemaRecord {
    pub id: String,
    pub registered_at: DateTime<Utc>,
    pub schema: Arc<Schema>,
}

impl SchemaRecord {
    fn new(schema: Schema) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            registered_at: Utc::now(),
            schema: Arc::new(schema),
        }
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            id: self.id.clone(),
            registered_at: self.registered_at,
            action_classes: self
                .schema
                .action_classes()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Listing entry for a registered schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub id: String,
    pub registered_at: DateTime<Utc>,
    pub action_classes: Vec<String>,
}

/// Storage for registered schemas.
pub trait SchemaRegistry: Send + Sync {
    /// Stores a validated schema under a freshly generated ID.
    fn register(&self, schema: Schema) -> Result<SchemaRecord, RegistryError>;

    /// Loads a schema by ID.
    ///
    /// Fails with [`RegistryError::SchemaNotFound`] if the ID is unknown.
    fn get(&self, id: &str) -> Result<SchemaRecord, RegistryError>;

    /// Summaries of every registered schema, oldest first.
    fn list(&self) -> Result<Vec<SchemaSummary>, RegistryError>;
}

/// Validates a raw schema document and registers it.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidSchema`] without storing anything if any
/// rule is malformed.
pub fn register_document(
    registry: &dyn SchemaRegistry,
    document: &serde_json::Value,
) -> Result<SchemaRecord, RegistryError> {
    let schema = Schema::from_document(document)?;
    let record = registry.register(schema)?;
    tracing::info!(
        schema_id = %record.id,
        action_classes = record.summary().action_classes.len(),
        "registered schema"
    );
    Ok(record)
}
