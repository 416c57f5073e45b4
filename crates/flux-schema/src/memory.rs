//! In-process schema registry.

use std::collections::HashMap;
use std::sync::RwLock;

use flux_types::Schema;

use crate::{RegistryError, SchemaRecord, SchemaRegistry, SchemaSummary};

/// Schema registry held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySchemaRegistry {
    schemas: RwLock<HashMap<String, SchemaRecord>>,
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaRegistry for MemorySchemaRegistry {
    fn register(&self, schema: Schema) -> Result<SchemaRecord, RegistryError> {
        let record = SchemaRecord::new(schema);
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;
        schemas.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<SchemaRecord, RegistryError> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        schemas
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::SchemaNotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<SchemaSummary>, RegistryError> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        let mut summaries: Vec<_> = schemas.values().map(SchemaRecord::summary).collect();
        summaries.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }
}
