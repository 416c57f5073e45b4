//! API handlers for the Flux server.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json, Path, RawQuery},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use flux_fanout::{BatchReport, FanoutError, QueryError};
use flux_schema::{RegistryError, SchemaSummary};
use flux_types::{RawEvent, StorageKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Response body for schema registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterSchemaResponse {
    pub id: String,
}

/// Response body for schema retrieval.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetSchemaResponse {
    pub id: String,
    pub registered_at: DateTime<Utc>,
    /// The schema document as registered, normalised.
    pub schema: Value,
}

/// Response body for queries.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Members across all requested keys, best first.
    pub results: Vec<String>,
    /// Members of each requested key, only when asked for with `by_key=true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_key: Option<BTreeMap<String, Vec<String>>>,
}

/// API error type mapping to HTTP status codes.
///
/// Every variant carries the error class label returned as `kind`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {message}")]
    BadRequest { kind: &'static str, message: String },
    #[error("not found: {message}")]
    NotFound { kind: &'static str, message: String },
    #[error("internal server error: {message}")]
    InternalServerError { kind: &'static str, message: String },
}

impl ApiError {
    fn bad_request(kind: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            kind,
            message: message.into(),
        }
    }

    fn internal(kind: &'static str, message: impl Into<String>) -> Self {
        Self::InternalServerError {
            kind,
            message: message.into(),
        }
    }

    fn join(e: tokio::task::JoinError) -> Self {
        Self::internal("internal", format!("task join error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest { kind, message } => (StatusCode::BAD_REQUEST, kind, message),
            ApiError::NotFound { kind, message } => (StatusCode::NOT_FOUND, kind, message),
            ApiError::InternalServerError { kind, message } => {
                tracing::error!(kind, error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, kind, message)
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let kind = e.kind();
        match e {
            RegistryError::InvalidSchema(_) => Self::bad_request(kind, e.to_string()),
            RegistryError::SchemaNotFound(_) => Self::NotFound {
                kind,
                message: e.to_string(),
            },
            _ => Self::internal(kind, e.to_string()),
        }
    }
}

impl From<FanoutError> for ApiError {
    fn from(e: FanoutError) -> Self {
        let kind = e.kind();
        match e {
            FanoutError::UnknownSchema(_) => Self::NotFound {
                kind,
                message: e.to_string(),
            },
            FanoutError::Event(_) => Self::bad_request(kind, e.to_string()),
            FanoutError::Store(_) | FanoutError::Registry(_) => Self::internal(kind, e.to_string()),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        let kind = e.kind();
        match e {
            QueryError::NoKeys | QueryError::InvalidMaxResults => {
                Self::bad_request(kind, e.to_string())
            }
            QueryError::Store(_) => Self::internal(kind, e.to_string()),
        }
    }
}

fn parse_json(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request("invalid_request", format!("malformed JSON: {}", e)))
}

/// Handler for `POST /schema`.
pub async fn register_schema_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RegisterSchemaResponse>, ApiError> {
    let document = parse_json(&body)?;

    let record = tokio::task::spawn_blocking(move || {
        flux_schema::register_document(state.registry.as_ref(), &document)
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(RegisterSchemaResponse { id: record.id }))
}

/// Handler for `GET /schema`.
pub async fn list_schemas_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<SchemaSummary>>, ApiError> {
    let summaries = tokio::task::spawn_blocking(move || state.registry.list())
        .await
        .map_err(ApiError::join)??;
    Ok(Json(summaries))
}

/// Handler for `GET /schema/{id}`.
pub async fn get_schema_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(schema_id): Path<String>,
) -> Result<Json<GetSchemaResponse>, ApiError> {
    let record = tokio::task::spawn_blocking(move || state.registry.get(&schema_id))
        .await
        .map_err(ApiError::join)??;

    Ok(Json(GetSchemaResponse {
        schema: record.schema.to_document(),
        id: record.id,
        registered_at: record.registered_at,
    }))
}

/// Handler for `POST /schema/{id}/events` and `POST /events/{id}`.
///
/// The body is an ordered array of `[eventType, payload]` pairs. Events
/// that fail are listed in the report; the response is still `200`.
pub async fn submit_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(schema_id): Path<String>,
    body: Bytes,
) -> Result<Json<BatchReport>, ApiError> {
    let Value::Array(items) = parse_json(&body)? else {
        return Err(ApiError::bad_request(
            "invalid_request",
            "event batch must be a JSON array",
        ));
    };

    if items.len() > state.max_batch_size {
        return Err(ApiError::bad_request(
            "batch_too_large",
            format!(
                "batch of {} events exceeds the limit of {}",
                items.len(),
                state.max_batch_size
            ),
        ));
    }

    let events = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<RawEvent>(item).map_err(|e| {
                ApiError::bad_request(
                    "invalid_event",
                    format!("event {index} must be [eventType, payloadObject]: {e}"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let report = tokio::task::spawn_blocking(move || {
        state.processor.process_batch(&schema_id, events)
    })
    .await
    .map_err(ApiError::join)??;

    Ok(Json(report))
}

/// Query parameters accepted by `GET /query`.
#[derive(Debug, Default, PartialEq)]
pub struct QueryParams {
    pub keys: Vec<String>,
    pub max_results: Option<String>,
    pub by_key: bool,
}

impl QueryParams {
    /// Parses a raw query string. Both `keys[]=` and `keys=` name keys.
    pub fn parse(raw: &str) -> Self {
        let mut params = Self::default();
        for (name, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match name.as_ref() {
                "keys[]" | "keys" => params.keys.push(value.into_owned()),
                "max_results" => params.max_results = Some(value.into_owned()),
                "by_key" => params.by_key = value == "true" || value == "1",
                _ => {}
            }
        }
        params
    }
}

/// Handler for `GET /query`.
pub async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Json<QueryResponse>, ApiError> {
    let params = QueryParams::parse(raw.as_deref().unwrap_or_default());

    let max_results = params
        .max_results
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("invalid_query", "max_results is required"))?
        .parse::<usize>()
        .map_err(|e| ApiError::bad_request("invalid_query", format!("invalid max_results: {}", e)))?
        .min(state.max_results_cap);

    let by_key = params.by_key;
    let keys: Vec<StorageKey> = params.keys.into_iter().map(StorageKey::from_raw).collect();

    let result = tokio::task::spawn_blocking(move || state.queries.query(&keys, max_results))
        .await
        .map_err(ApiError::join)??;

    Ok(Json(QueryResponse {
        results: result.merged,
        by_key: by_key.then_some(result.by_key),
    }))
}
