//! Verification endpoints.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::state::AppState;
use crate::verify::{VerifyParams, VerifyView};

use super::{status_code, with_scan_status};

/// Page view model for a scanned token
///
/// Always answers 200: failures are verdicts the page renders.
pub async fn verify_page(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let outcome = state.verify.verify(&params, true).await;
    let view = VerifyView::build(&outcome, params.language(), Utc::now());

    tracing::debug!(
        status = %view.verdict.status,
        bucket = view.verdict.bucket.as_str(),
        "Rendered verification view"
    );

    let status = view.verdict.status.clone();
    with_scan_status(Json(view).into_response(), &status)
}

/// Normalized payload for API callers
pub async fn verify_api(
    State(state): State<AppState>,
    Json(params): Json<VerifyParams>,
) -> Response {
    let outcome = state.verify.verify(&params, false).await;
    let status = outcome.status_token().to_string();

    let response = (status_code(outcome.http_status), Json(outcome.payload)).into_response();
    with_scan_status(response, &status)
}
