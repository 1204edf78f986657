//! Route handlers and router assembly.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use super::guard::enforce_quota;
use super::AppState;

/// Build the service router.
///
/// Only the API routes sit behind the quota guard; the health check is open.
pub fn router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/api/simulate", post(simulate))
        .route("/api/simulate/", post(simulate))
        .route_layer(middleware::from_fn_with_state(state.clone(), enforce_quota));

    Router::new()
        .route("/", get(health))
        .merge(guarded)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Stand-in for downstream processing: waits, then echoes the body.
async fn simulate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let request_body: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            debug!(error = %e, "Rejecting malformed JSON body");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Request body must be valid JSON" })),
            )
        })?
    };

    tokio::time::sleep(state.simulate_delay()).await;

    Ok(Json(json!({
        "message": "Request processed successfully",
        "timestamp": Utc::now().to_rfc3339(),
        "request_body": request_body,
    })))
}
