//! HTTP REST API for the knowledge base.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function. The inner functions are directly testable without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health  — health check with DB and pgvector status
//! - GET  /version — server version info
//! - POST /search  — retrieval dispatcher (four search types)
//! - POST /sync    — list an S3 prefix and queue documents for ingestion

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use vectorkb_core::config::HttpConfig;
use vectorkb_core::embeddings::EmbeddingBackend;

use crate::subsystems::retrieve;
use crate::subsystems::sync::{self, SyncContext, SyncRequest};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: PgPool,
    pub backend: Arc<dyn EmbeddingBackend>,
    /// None when no ingestion queue is configured; /sync returns 503
    pub sync: Option<Arc<SyncContext>>,
}

/// Build the axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/search", post(search_handler))
        .route("/sync", post(sync_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    http: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", http.host, http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — queries DB and returns (status_code, json_body).
pub async fn health_inner(pool: &PgPool) -> (StatusCode, serde_json::Value) {
    let pg_ver = match vectorkb_core::db::health_check(pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    let pgvector_ver = match vectorkb_core::db::check_pgvector(pool).await {
        Ok(v) => v,
        Err(e) => format!("unavailable: {}", e),
    };

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "postgresql": pg_ver,
            "pgvector": pgvector_ver,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "embedding_model": vectorkb_core::TITAN_MODEL_ID,
    })
}

/// Inner search — runs the dispatcher and maps its envelope to a status code.
pub async fn search_inner(
    pool: &PgPool,
    backend: &dyn EmbeddingBackend,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let envelope = retrieve::dispatch_search(pool, backend, &body).await;
    (search_status(&envelope), envelope)
}

/// Inner sync — runs the sync pipeline and maps its envelope to a status code.
pub async fn sync_inner(
    sync_ctx: Option<&SyncContext>,
    req: SyncRequest,
) -> (StatusCode, serde_json::Value) {
    let Some(ctx) = sync_ctx else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "error",
                "files_queued": 0,
                "message": "No ingestion queue configured",
            }),
        );
    };

    let envelope = sync::dispatch_sync(ctx, req).await;
    (sync_status(&envelope), envelope)
}

/// Map a search envelope to an HTTP status code.
pub fn search_status(envelope: &serde_json::Value) -> StatusCode {
    if envelope["status"] == "success" {
        return StatusCode::OK;
    }
    match envelope["error_type"].as_str() {
        Some("validation_error") => StatusCode::BAD_REQUEST,
        Some("aws_service_error") => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a sync envelope to an HTTP status code.
pub fn sync_status(envelope: &serde_json::Value) -> StatusCode {
    if envelope["status"] == "success" {
        return StatusCode::OK;
    }
    match envelope["message"].as_str() {
        Some("Invalid or expired JWT token") => StatusCode::UNAUTHORIZED,
        Some(msg) if msg.starts_with("Validation error") => StatusCode::BAD_REQUEST,
        Some(msg) if msg.starts_with("AWS service error") => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn search_handler(
    State(state): State<Arc<HttpState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let (status, body) = search_inner(&state.pool, state.backend.as_ref(), body).await;
    (status, Json(body))
}

pub async fn sync_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SyncRequest>,
) -> impl IntoResponse {
    let (status, body) = sync_inner(state.sync.as_deref(), req).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["embedding_model"], vectorkb_core::TITAN_MODEL_ID);
    }

    #[test]
    fn test_search_status_success() {
        let envelope = serde_json::json!({ "status": "success", "total_results": 0 });
        assert_eq!(search_status(&envelope), StatusCode::OK);
    }

    #[test]
    fn test_search_status_by_error_type() {
        let cases = [
            ("validation_error", StatusCode::BAD_REQUEST),
            ("aws_service_error", StatusCode::BAD_GATEWAY),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error_type, expected) in cases {
            let envelope = serde_json::json!({
                "status": "error",
                "error_type": error_type,
                "message": "x",
            });
            assert_eq!(search_status(&envelope), expected, "{error_type}");
        }
    }

    #[test]
    fn test_sync_status_mapping() {
        let ok = serde_json::json!({ "status": "success" });
        assert_eq!(sync_status(&ok), StatusCode::OK);

        let unauthorized = serde_json::json!({
            "status": "error",
            "message": "Invalid or expired JWT token",
        });
        assert_eq!(sync_status(&unauthorized), StatusCode::UNAUTHORIZED);

        let validation = serde_json::json!({
            "status": "error",
            "message": "Validation error: s3_bucket parameter is required",
        });
        assert_eq!(sync_status(&validation), StatusCode::BAD_REQUEST);

        let aws = serde_json::json!({
            "status": "error",
            "message": "AWS service error: Throttling",
        });
        assert_eq!(sync_status(&aws), StatusCode::BAD_GATEWAY);

        let internal = serde_json::json!({
            "status": "error",
            "message": "Internal server error: boom",
        });
        assert_eq!(sync_status(&internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_sync_inner_without_queue() {
        let (status, body) = sync_inner(None, SyncRequest::default()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["files_queued"], 0);
    }
}
