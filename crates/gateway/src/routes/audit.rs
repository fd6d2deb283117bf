//! Per-request audit log.

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderMap, header::USER_AGENT},
    middleware::Next,
    response::Response,
};
use tracing::info;

use scanproof_common::constants::headers::{
    CF_CONNECTING_IP, X_FORWARDED_FOR, X_ORIGINAL_FORWARDED_FOR, X_SCAN_STATUS,
};

const UNAUDITED_PATHS: &[&str] = &["/health", "/healthz", "/ready"];

/// Log one structured record per request, after the handler has run
pub async fn audit(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if UNAUDITED_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let headers = request.headers();
    let client_ip = client_ip(headers).unwrap_or_default();
    let cf_client_ip = header(headers, CF_CONNECTING_IP).unwrap_or_default();
    let user_agent = header(headers, USER_AGENT.as_str()).unwrap_or_default();

    let started = Instant::now();
    let response = next.run(request).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let scan_status = header(response.headers(), X_SCAN_STATUS).unwrap_or_default();

    info!(
        target: "audit",
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms,
        client_ip = %client_ip,
        cf_client_ip = %cf_client_ip,
        user_agent = %user_agent,
        scan_status = %scan_status,
        "request"
    );

    response
}

/// First hop of the ingress forwarded-for chain
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    header(headers, X_ORIGINAL_FORWARDED_FOR)
        .or_else(|| header(headers, X_FORWARDED_FOR))
        .and_then(|chain| chain.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
