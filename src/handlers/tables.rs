use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::auth::AuthenticatedUser;
use crate::entities::dining_table::Model as TableModel;
use crate::errors::ServiceError;
use crate::services::catalog::CreateTableInput;
use crate::{ApiResponse, AppState};

/// List active tables, ordered by their printed number.
#[utoipa::path(
    get,
    path = "/tables",
    responses(
        (status = 200, description = "Active tables", body = crate::ApiResponse<Vec<crate::entities::dining_table::Model>>)
    ),
    tag = "Tables"
)]
pub async fn list_tables(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TableModel>>>, ServiceError> {
    let tables = state.services.catalog.list_active_tables().await?;
    Ok(Json(ApiResponse::success(tables)))
}

/// Resolve a table from its printed number (the QR landing lookup).
#[utoipa::path(
    get,
    path = "/tables/{table_number}",
    params(("table_number" = i32, Path, description = "Printed table number")),
    responses(
        (status = 200, description = "Table", body = crate::ApiResponse<crate::entities::dining_table::Model>),
        (status = 404, description = "No active table with that number", body = crate::errors::ErrorResponse)
    ),
    tag = "Tables"
)]
pub async fn get_table_by_number(
    State(state): State<AppState>,
    Path(table_number): Path<i32>,
) -> Result<Json<ApiResponse<TableModel>>, ServiceError> {
    let table = state
        .services
        .catalog
        .get_table_by_number(table_number)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Table not found".to_string()))?;

    Ok(Json(ApiResponse::success(table)))
}

/// Register a new table and generate its QR link. Staff only.
#[utoipa::path(
    post,
    path = "/tables",
    request_body = CreateTableInput,
    responses(
        (status = 200, description = "Table created", body = crate::ApiResponse<crate::entities::dining_table::Model>),
        (status = 400, description = "Duplicate table number", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing credentials", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not staff", body = crate::errors::ErrorResponse)
    ),
    tag = "Tables"
)]
pub async fn create_table(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateTableInput>,
) -> Result<Json<ApiResponse<TableModel>>, ServiceError> {
    if !user.is_staff() {
        return Err(ServiceError::Forbidden(
            "Insufficient permissions".to_string(),
        ));
    }

    let table = state
        .services
        .catalog
        .create_table(input, &state.config.public_base_url)
        .await?;

    Ok(Json(ApiResponse::success(table)))
}
