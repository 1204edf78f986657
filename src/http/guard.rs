//! Middleware enforcing authentication and per-endpoint quotas.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::auth::bearer_token;
use super::AppState;
use crate::ratelimit::{Decision, RequestKey};

pub(crate) const MISSING_AUTH: &str = "Missing or invalid Authorization header";
pub(crate) const NO_PERMISSION: &str = "This token does not have permission to access this API route";
pub(crate) const TOO_MANY_REQUESTS: &str = "Too many requests";
pub(crate) const DECISION_UNAVAILABLE: &str = "Rate limit decision unavailable";

/// Admit, throttle or reject a request before it reaches its handler.
pub async fn enforce_quota(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let received_at = Utc::now();

    info!(
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
        timestamp = %received_at.to_rfc3339(),
        "Received request"
    );

    let Some(token) = bearer_token(request.headers()) else {
        warn!(request_id = %request_id, "Rejecting request without bearer token");
        return error_response(StatusCode::UNAUTHORIZED, MISSING_AUTH);
    };

    let uri = request.uri();
    let endpoint = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let key = RequestKey::new(endpoint, token);

    match state.limiter().check_at(&key, received_at).await {
        Ok(Decision::Admit) => next.run(request).await,
        Ok(Decision::Throttled { retry_after }) => {
            info!(
                request_id = %request_id,
                identity = %key.identity(),
                endpoint = %key.endpoint(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Identity exceeded rate limit"
            );
            throttled_response(retry_after)
        }
        Ok(Decision::Denied(reason)) => {
            info!(request_id = %request_id, key = %key, reason = %reason, "Request denied");
            error_response(StatusCode::UNAUTHORIZED, NO_PERMISSION)
        }
        Err(e) => {
            error!(request_id = %request_id, key = %key, error = %e, "Rate limit check failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, DECISION_UNAVAILABLE)
        }
    }
}

/// `Retry-After` carries whole seconds, rounded up.
pub(crate) fn retry_after_secs(retry_after: Duration) -> u64 {
    let millis = retry_after.as_millis() as u64;
    millis.div_ceil(1000)
}

fn throttled_response(retry_after: Duration) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after_secs(retry_after).to_string())],
        Json(json!({
            "error": TOO_MANY_REQUESTS,
            "retry_after_ms": retry_after.as_millis() as u64,
        })),
    )
        .into_response()
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
