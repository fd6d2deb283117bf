//! Generic backend proxy endpoint.

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::Method,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use scanproof_common::ProxyError;

use crate::proxy::ProxyRequest;
use crate::state::AppState;

use super::{ApiError, status_code};

/// Query parameter carrying the encoded backend URL
const URL_PARAM: &str = "url";

/// Forward to the decoded target; every other query parameter fills a
/// `{name}` placeholder
pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    Query(mut params): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let encoded_target = params
        .remove(URL_PARAM)
        .ok_or_else(|| ProxyError::InvalidEncoding("url parameter is required".to_string()))?;

    let body = match method {
        Method::GET | Method::DELETE => None,
        _ if body.is_empty() => None,
        _ => Some(body.to_vec()),
    };

    let request = ProxyRequest {
        encoded_target,
        method,
        substitutions: params,
        body,
    };

    match state.proxy.forward(request).await {
        Ok(upstream) => Ok((status_code(upstream.status), Json(upstream.body)).into_response()),
        Err(ProxyError::UpstreamError { status, body }) => {
            tracing::warn!(upstream_status = status, "Proxied request rejected upstream");
            let body = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| {
                json!({
                    "error": format!("Upstream returned status {status}"),
                    "status": status,
                    "body": body,
                })
            });
            Ok((status_code(status), Json(body)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}
