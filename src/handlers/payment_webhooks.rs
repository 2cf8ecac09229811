use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::handlers::common::enforce_ip_rate_limit;
use crate::rate_limiter::extract_client_ip;
use crate::services::reconciliation::WebhookNotification;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub status: String,
    pub message: String,
    pub order: WebhookOrderState,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookOrderState {
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
}

/// Receive an asynchronous payment-status notification from the gateway.
///
/// The gateway retries deliveries on non-2xx answers, so every guard in here
/// is ordered to fail fast and cheaply: rate limit, content type, body size,
/// schema, then reconciliation proper.
#[utoipa::path(
    post,
    path = "/webhooks/payment",
    request_body = WebhookNotification,
    responses(
        (status = 200, description = "Notification applied (or duplicate acknowledged)", body = WebhookAck),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 413, description = "Body exceeds ceiling", body = crate::errors::ErrorResponse),
        (status = 415, description = "Not JSON", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    enforce_ip_rate_limit(&state.rate_limits.webhook, &headers).await?;

    let client_ip = extract_client_ip(&headers);

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(ServiceError::UnsupportedMediaType);
    }

    if body.len() > state.config.webhook_max_body_bytes {
        warn!(
            client_ip = %client_ip,
            body_len = body.len(),
            "Webhook body exceeds configured ceiling"
        );
        return Err(ServiceError::PayloadTooLarge);
    }

    let notification: WebhookNotification = serde_json::from_slice(&body).map_err(|e| {
        warn!(client_ip = %client_ip, error = %e, "Webhook payload failed schema validation");
        ServiceError::BadRequest("Invalid payload structure".to_string())
    })?;

    info!(
        order_id = %notification.order_id,
        transaction_status = %notification.transaction_status,
        client_ip = %client_ip,
        "Webhook received"
    );

    let outcome = state
        .services
        .reconciliation
        .process(notification, &client_ip)
        .await?;

    let message = if outcome.already_processed {
        "Order already processed".to_string()
    } else if outcome.changed {
        "Order updated successfully".to_string()
    } else {
        "No status change applied".to_string()
    };

    Ok(Json(WebhookAck {
        status: "success".to_string(),
        message,
        order: WebhookOrderState {
            order_number: outcome.order_number,
            status: outcome.status,
            payment_status: outcome.payment_status,
        },
    }))
}
