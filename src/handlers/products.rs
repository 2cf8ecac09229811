use axum::{extract::State, response::Json};

use crate::auth::AuthenticatedUser;
use crate::entities::product::Model as ProductModel;
use crate::errors::ServiceError;
use crate::services::catalog::CreateProductInput;
use crate::{ApiResponse, AppState};

/// List available menu products, newest first.
#[utoipa::path(
    get,
    path = "/products",
    responses(
        (status = 200, description = "Available products", body = crate::ApiResponse<Vec<crate::entities::product::Model>>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductModel>>>, ServiceError> {
    let products = state.services.catalog.list_available_products().await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Add a product to the menu. Staff only.
#[utoipa::path(
    post,
    path = "/products",
    request_body = CreateProductInput,
    responses(
        (status = 200, description = "Product created", body = crate::ApiResponse<crate::entities::product::Model>),
        (status = 401, description = "Missing credentials", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not staff", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateProductInput>,
) -> Result<Json<ApiResponse<ProductModel>>, ServiceError> {
    if !user.is_staff() {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }

    let product = state.services.catalog.create_product(input).await?;
    Ok(Json(ApiResponse::success(product)))
}
