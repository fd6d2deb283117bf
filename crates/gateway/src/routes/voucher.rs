//! Voucher action endpoint.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};

use crate::state::AppState;
use crate::voucher::VoucherRequest;

use super::{status_code, with_scan_status};

pub async fn voucher_action(
    State(state): State<AppState>,
    Json(request): Json<VoucherRequest>,
) -> Response {
    let reply = state.vouchers.handle(&request).await;
    let status = reply.status_token().to_string();

    let response = (status_code(reply.status), Json(reply.body)).into_response();
    with_scan_status(response, &status)
}
