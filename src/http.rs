//! HTTP surface: signed webhooks, mapping rule management and health checks.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::events::{WebhookPayload, WebhookService};
use crate::mapping::{MappingRuleService, RuleError, RuleInput};
use crate::store::{RuleFilter, StoreError};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Reports whether the message bus is usable
pub type ReadinessCheck = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub webhooks: Arc<WebhookService>,
    pub rules: MappingRuleService,
    pub bus_ready: ReadinessCheck,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hook", post(handle_webhook))
        .route("/api/mappings", get(list_mappings).post(upsert_mapping))
        .route("/api/mappings/:id", delete(delete_mapping))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Error answered as `{error, message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Invalid(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            RuleError::Store(StoreError::NotFound(what)) => {
                ApiError::new(StatusCode::NOT_FOUND, "not_found", format!("{} not found", what))
            }
            RuleError::Store(e) => {
                tracing::error!("Mapping store error: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// POST /hook
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(signature) = header(&headers, SIGNATURE_HEADER) else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "missing_signature",
            "X-Webhook-Signature header is required",
        ));
    };
    let Some(event_type) = header(&headers, EVENT_HEADER) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing_event_type",
            "X-Webhook-Event header is required",
        ));
    };

    if !state.webhooks.verify_signature(&body, signature) {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "Webhook signature verification failed",
        ));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|_| {
            ApiError::new(StatusCode::BAD_REQUEST, "invalid_json", "Failed to parse request body")
        })?;

    state
        .webhooks
        .process_webhook(event_type, payload.data)
        .await
        .map_err(|e| {
            tracing::error!("Failed to process webhook {}: {}", event_type, e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "process_failed", e.to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Webhook received and published",
    })))
}

/// GET /api/mappings
async fn list_mappings(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RuleFilter>,
) -> Result<Json<Value>, ApiError> {
    let mappings = state.rules.list(&filter)?;
    Ok(Json(json!({
        "count": mappings.len(),
        "mappings": mappings,
    })))
}

/// POST /api/mappings
async fn upsert_mapping(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let input: RuleInput = serde_json::from_slice(&body)
        .map_err(|_| {
            ApiError::new(StatusCode::BAD_REQUEST, "invalid_json", "Failed to parse request body")
        })?;
    let mapping = state.rules.upsert(input)?;
    Ok(Json(json!({ "mapping": mapping })))
}

/// DELETE /api/mappings/:id
async fn delete_mapping(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.rules.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "shopbridge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness: the bus connection must be up
async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    if (state.bus_ready)() {
        Ok(Json(json!({
            "status": "ready",
            "service": "shopbridge",
            "bus": "connected",
        })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
