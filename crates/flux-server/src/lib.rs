//! Flux server library logic.

pub mod api;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::{Config, StorageBackend};
use flux_db::DbRuntimeSettings;
use flux_fanout::{EventProcessor, QueryService};
use flux_schema::{MemorySchemaRegistry, SchemaRegistry, SqliteSchemaRegistry};
use flux_store::{CollectionStore, MemoryStore, SqliteStore};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registered schemas.
    pub registry: Arc<dyn SchemaRegistry>,
    /// Write side: batches of events against a schema.
    pub processor: EventProcessor,
    /// Read side: members of requested keys.
    pub queries: QueryService,
    /// Largest accepted event batch.
    pub max_batch_size: usize,
    /// Upper bound on a query's `max_results`.
    pub max_results_cap: usize,
}

/// Errors that prevent the server state from being built.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open database pool: {0}")]
    Pool(#[from] flux_db::PoolError),

    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("failed to run database migrations: {0}")]
    Migration(#[from] flux_db::MigrationError),
}

impl AppState {
    /// Wires a registry and store together with the configured limits.
    pub fn new(
        registry: Arc<dyn SchemaRegistry>,
        store: Arc<dyn CollectionStore>,
        config: &Config,
    ) -> Self {
        Self {
            processor: EventProcessor::new(Arc::clone(&registry), Arc::clone(&store)),
            queries: QueryService::new(store),
            registry,
            max_batch_size: config.events.max_batch_size,
            max_results_cap: config.query.max_results_cap,
        }
    }

    /// State backed by in-process collections and schemas.
    pub fn in_memory(config: &Config) -> Self {
        Self::new(
            Arc::new(MemorySchemaRegistry::new()),
            Arc::new(MemoryStore::new()),
            config,
        )
    }

    /// Builds state for the backend named in `config.storage`.
    ///
    /// # Errors
    ///
    /// Returns `StartupError` if the SQLite database cannot be opened or
    /// migrated.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        match config.storage.backend {
            StorageBackend::Memory => Ok(Self::in_memory(config)),
            StorageBackend::Sqlite => {
                let pool = flux_db::create_pool(
                    &config.storage.path,
                    DbRuntimeSettings {
                        busy_timeout_ms: config.storage.busy_timeout_ms,
                        pool_max_size: config.storage.pool_max_size,
                    },
                )?;
                {
                    let conn = pool.get()?;
                    let applied = flux_db::run_migrations(&conn)?;
                    if applied > 0 {
                        tracing::info!(count = applied, "applied database migrations");
                    }
                }
                Ok(Self::new(
                    Arc::new(SqliteSchemaRegistry::new(pool.clone())),
                    Arc::new(SqliteStore::new(pool)),
                    config,
                ))
            }
        }
    }
}

/// Maximum request body size (2 MiB). Protects against OOM from oversized payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/schema",
            post(api::register_schema_handler).get(api::list_schemas_handler),
        )
        .route("/schema/{id}", get(api::get_schema_handler))
        .route("/schema/{id}/events", post(api::submit_events_handler))
        .route("/events/{id}", post(api::submit_events_handler))
        .route("/query", get(api::query_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
