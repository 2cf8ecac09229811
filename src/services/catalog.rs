use crate::{
    db::DbPool,
    entities::dining_table::{
        self, ActiveModel as TableActiveModel, Entity as TableEntity, Model as TableModel,
    },
    entities::product::{
        self, ActiveModel as ProductActiveModel, Entity as ProductEntity, Model as ProductModel,
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTableInput {
    #[validate(range(min = 1, message = "Table number must be positive"))]
    pub table_number: i32,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 120, message = "Product name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub is_available: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub customization_options: Option<serde_json::Value>,
}

/// Read-side lookups for tables and products, plus the staff-facing writes.
///
/// The ordering flow only ever reads through this service; pricing looks up
/// the product row at order time and the price is snapshotted onto the order
/// item from there.
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Active tables ordered by their printed number
    pub async fn list_active_tables(&self) -> Result<Vec<TableModel>, ServiceError> {
        let db = &*self.db_pool;

        TableEntity::find()
            .filter(dining_table::Column::IsActive.eq(true))
            .order_by_asc(dining_table::Column::TableNumber)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch tables");
                ServiceError::DatabaseError(e)
            })
    }

    /// Resolve a table by id, active tables only.
    pub async fn get_active_table(&self, table_id: Uuid) -> Result<Option<TableModel>, ServiceError> {
        let db = &*self.db_pool;

        TableEntity::find()
            .filter(dining_table::Column::Id.eq(table_id))
            .filter(dining_table::Column::IsActive.eq(true))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Resolve a table by its printed number (the QR landing lookup).
    pub async fn get_table_by_number(
        &self,
        table_number: i32,
    ) -> Result<Option<TableModel>, ServiceError> {
        let db = &*self.db_pool;

        TableEntity::find()
            .filter(dining_table::Column::TableNumber.eq(table_number))
            .filter(dining_table::Column::IsActive.eq(true))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Create a table and derive its QR link from the public base URL.
    #[instrument(skip(self), fields(table_number = input.table_number))]
    pub async fn create_table(
        &self,
        input: CreateTableInput,
        public_base_url: &str,
    ) -> Result<TableModel, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let existing = TableEntity::find()
            .filter(dining_table::Column::TableNumber.eq(input.table_number))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if existing.is_some() {
            return Err(ServiceError::ValidationError(
                "Table number already exists".to_string(),
            ));
        }

        let qr_code = format!(
            "{}/table/{}",
            public_base_url.trim_end_matches('/'),
            input.table_number
        );

        let table = TableActiveModel {
            id: Set(Uuid::new_v4()),
            table_number: Set(input.table_number),
            qr_code: Set(qr_code),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create table");
            ServiceError::DatabaseError(e)
        })?;

        info!(table_id = %table.id, table_number = table.table_number, "Table created");

        Ok(table)
    }

    /// Available menu items, newest first
    pub async fn list_available_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        let db = &*self.db_pool;

        ProductEntity::find()
            .filter(product::Column::IsAvailable.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch products");
                ServiceError::DatabaseError(e)
            })
    }

    /// Resolve a product by id (availability is not checked here; pricing
    /// treats an unavailable product the same as a missing one at the caller).
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductModel>, ServiceError> {
        let db = &*self.db_pool;

        ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let model = ProductActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            category_id: Set(input.category_id),
            image_url: Set(input.image_url),
            is_available: Set(input.is_available.unwrap_or(true)),
            customization_options: Set(input.customization_options),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %model.id, "Product created");

        Ok(model)
    }
}
