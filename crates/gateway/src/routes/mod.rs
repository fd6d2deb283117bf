//! HTTP route handlers for the gateway.

use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use scanproof_common::{ProxyError, ScanError};
use scanproof_common::constants::headers::X_SCAN_STATUS;

use crate::state::AppState;

mod audit;
mod proxy;
mod verify;
mod voucher;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Verification
        .route("/verify", get(verify::verify_page))
        .route("/api/verify", post(verify::verify_api))
        // Backend proxy (encoded target + placeholder values)
        .route(
            "/api/proxy",
            get(proxy::forward)
                .post(proxy::forward)
                .put(proxy::forward)
                .patch(proxy::forward)
                .delete(proxy::forward),
        )
        // Voucher actions
        .route("/api/voucher", post(voucher::voucher_action))
        .layer(middleware::from_fn(audit::audit))
        .layer(TraceLayer::new_for_http())
        // Add shared state
        .with_state(state)
}

/// Error body `{ "error": ... }` with the mapped status code
#[derive(Debug)]
pub struct ApiError(pub ScanError);

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        Self(err)
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(self.0.status_code());
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        (status, Json(json!({ "error": self.0.public_message() }))).into_response()
    }
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Attach the verdict status for the audit log
fn with_scan_status(mut response: Response, status: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(status) {
        response.headers_mut().insert(X_SCAN_STATUS, value);
    }
    response
}
