use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use std::str::FromStr;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, MaybeAuthenticated};
use crate::errors::ServiceError;
use crate::handlers::common::{enforce_ip_rate_limit, sanitize_query_value};
use crate::models::OrderStatus;
use crate::services::orders::{CreateOrderInput, OrderDetail, OrderListFilter, UpdateOrderFields};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    /// Restrict to orders placed by this customer
    pub user_id: Option<String>,
    /// Restrict to orders in this lifecycle status
    pub status: Option<String>,
}

/// Place a new order for a table.
///
/// Walk-up guests order without credentials; a signed-in customer's id is
/// attached to the order for their history view.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderInput,
    responses(
        (status = 200, description = "Order created", body = crate::ApiResponse<OrderDetail>),
        (status = 400, description = "Invalid table or input", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    MaybeAuthenticated(user): MaybeAuthenticated,
    Json(mut input): Json<CreateOrderInput>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    input.user_id = user.map(|u| u.user_id);

    let detail = state.services.orders.create_order(input).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// List orders, optionally filtered by customer and status.
#[utoipa::path(
    get,
    path = "/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders", body = crate::ApiResponse<Vec<OrderDetail>>),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<Vec<OrderDetail>>>, ServiceError> {
    enforce_ip_rate_limit(&state.rate_limits.orders, &headers).await?;

    let user_id = match query.user_id.as_deref().map(sanitize_query_value) {
        None => None,
        Some(raw) if raw.is_empty() => None,
        Some(raw) => Some(
            Uuid::parse_str(&raw)
                .map_err(|_| ServiceError::ValidationError("Invalid user_id".to_string()))?,
        ),
    };

    let status = match query.status.as_deref().map(sanitize_query_value) {
        None => None,
        Some(raw) if raw.is_empty() => None,
        Some(raw) => Some(
            OrderStatus::from_str(&raw.to_ascii_lowercase())
                .map_err(|_| ServiceError::ValidationError(format!("Unknown order status: {raw}")))?,
        ),
    };

    let orders = state
        .services
        .orders
        .list_orders(OrderListFilter { user_id, status })
        .await?;

    Ok(Json(ApiResponse::success(orders)))
}

/// Fetch one order with its items, table, and customer.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = crate::ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_order_detail(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

    Ok(Json(ApiResponse::success(detail)))
}

/// Patch order fields.
///
/// Allowed for staff on any order, and for a customer on their own order
/// (e.g. cancelling before the kitchen confirms).
#[utoipa::path(
    patch,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderFields,
    responses(
        (status = 200, description = "Updated order", body = crate::ApiResponse<crate::services::orders::OrderResponse>),
        (status = 401, description = "Missing credentials", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner and not staff", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(fields): Json<UpdateOrderFields>,
) -> Result<Json<ApiResponse<crate::services::orders::OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_row(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

    let is_owner = order.user_id == Some(user.user_id);
    if !user.is_staff() && !is_owner {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }

    if fields.is_empty() {
        return Err(ServiceError::ValidationError(
            "No updatable fields provided".to_string(),
        ));
    }

    let updated = state.services.orders.update_order(id, fields).await?;
    Ok(Json(ApiResponse::success(updated)))
}
