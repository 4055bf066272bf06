use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::payments::{PaymentCallback, PaymentSettlement},
    error::{AppError, AppResult},
    response::ApiResponse,
    services::payment_service::{self, SIGNATURE_HEADER},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/callback", post(payment_callback))
}

#[utoipa::path(
    post,
    path = "/api/payments/callback",
    params(
        ("x-signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body"),
    ),
    request_body = PaymentCallback,
    responses(
        (status = 200, description = "Payment settled", body = ApiResponse<PaymentSettlement>),
        (status = 401, description = "Missing or invalid signature"),
        (status = 404, description = "Unknown tx_ref"),
        (status = 409, description = "Payment already settled"),
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<PaymentSettlement>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated("Missing webhook signature".into()))?;
    payment_service::verify_signature(&state.config.payment_webhook_secret, &body, signature)?;

    let callback: PaymentCallback =
        serde_json::from_slice(&body).map_err(|e| AppError::field("body", e.to_string()))?;
    let resp = payment_service::handle_callback(&state, callback).await?;
    Ok(Json(resp))
}
