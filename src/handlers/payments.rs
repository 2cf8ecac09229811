use axum::{extract::State, response::Json};

use crate::errors::ServiceError;
use crate::services::payment_sessions::{CreateSessionRequest, PaymentSession};
use crate::AppState;

/// Create a hosted-payment-page session for a pending order.
///
/// The storefront calls this right after order creation and redirects the
/// customer to the returned URL; settlement arrives later through the
/// webhook endpoint.
#[utoipa::path(
    post,
    path = "/payment/create-session",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Payment session created", body = PaymentSession),
        (status = 400, description = "Missing transaction details", body = crate::errors::ErrorResponse),
        (status = 500, description = "Gateway rejection or misconfiguration", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<PaymentSession>, ServiceError> {
    let session = state
        .services
        .payment_sessions
        .create_session(request)
        .await?;

    Ok(Json(session))
}
