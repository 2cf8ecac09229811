use crate::{
    db::DbPool,
    entities::dining_table::{Entity as TableEntity, Model as TableModel},
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
    },
    entities::order_item::{
        self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity,
        Model as OrderItemModel,
    },
    entities::product::{Entity as ProductEntity, Model as ProductModel},
    entities::profile::{Entity as ProfileEntity},
    errors::ServiceError,
    models::{OrderStatus, PaymentStatus},
    services::catalog::CatalogService,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Generates the human-facing order number, which doubles as the correlation
/// key the payment gateway echoes back in webhook notifications.
pub fn generate_order_number() -> String {
    let timestamp = Utc::now().timestamp_millis();
    let random: u32 = rand::thread_rng().gen_range(0..1000);
    format!("ORDER-{}-{}", timestamp, random)
}

/// Request/response types for the order service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    pub table_id: Uuid,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<NewOrderItem>,
    pub notes: Option<String>,
    #[serde(skip)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = Option<Object>)]
    pub customizations: Option<serde_json::Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderFields {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl UpdateOrderFields {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.payment_status.is_none()
            && self.payment_method.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub gateway_order_id: String,
    pub table_id: Uuid,
    pub user_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub status: String,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Present when the product still exists; historical orders survive menu
    /// deletions.
    pub product_name: Option<String>,
    pub product_image_url: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    #[schema(value_type = Option<Object>)]
    pub customizations: Option<serde_json::Value>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableSummary {
    pub id: Uuid,
    pub table_number: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: String,
}

/// Order projection with its line items and the joined table/customer rows,
/// mirroring what the storefront renders on the order tracking screen.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
    pub table: Option<TableSummary>,
    pub customer: Option<CustomerSummary>,
}

#[derive(Debug, Default)]
pub struct OrderListFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

/// Service for creating and reading orders.
///
/// Creation re-prices every submitted line against the current product table.
/// Items whose product id does not resolve are dropped from both the total
/// and the persisted rows; the order itself still persists (even with zero
/// surviving items), matching the storefront's checkout contract.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    catalog: Arc<CatalogService>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, catalog: Arc<CatalogService>) -> Self {
        Self { db_pool, catalog }
    }

    /// Creates an order plus its line items in one transaction.
    ///
    /// A failure while inserting items rolls the order row back, so no
    /// partially-written order is ever visible to readers.
    #[instrument(skip(self, input), fields(table_id = %input.table_id))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<OrderDetail, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        for item in &input.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "Item quantity must be at least 1".to_string(),
                ));
            }
        }

        let table = self
            .catalog
            .get_active_table(input.table_id)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Invalid table".to_string()))?;

        // Re-price every submitted line against the current menu. Lines whose
        // product does not resolve are dropped silently.
        let mut priced_items: Vec<(ProductModel, NewOrderItem)> = Vec::new();
        let mut total_amount = Decimal::ZERO;

        for item in input.items {
            match self.catalog.get_product(item.product_id).await? {
                Some(product) => {
                    total_amount += product.price * Decimal::from(item.quantity);
                    priced_items.push((product, item));
                }
                None => {
                    debug!(product_id = %item.product_id, "Dropping order line for unknown product");
                }
            }
        }

        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = OrderActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            // The gateway correlation key is the order number at creation time.
            gateway_order_id: Set(order_number.clone()),
            table_id: Set(table.id),
            user_id: Set(input.user_id),
            total_amount: Set(total_amount),
            status: Set(OrderStatus::Pending.to_string()),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            payment_method: Set(None),
            gateway_transaction_id: Set(None),
            notes: Set(input.notes),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order");
            ServiceError::DatabaseError(e)
        })?;

        let mut item_models: Vec<OrderItemModel> = Vec::with_capacity(priced_items.len());
        let mut product_names: HashMap<Uuid, ProductModel> = HashMap::new();

        for (product, item) in priced_items {
            let inserted = OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                quantity: Set(item.quantity),
                unit_price: Set(product.price),
                customizations: Set(item.customizations),
                notes: Set(item.notes),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order items; rolling order back");
                ServiceError::DatabaseError(e)
            })?;

            item_models.push(inserted);
            product_names.insert(product.id, product);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            order_number = %order_model.order_number,
            total_amount = %order_model.total_amount,
            item_count = item_models.len(),
            "Order created"
        );

        let items = item_models
            .iter()
            .map(|item| map_item(item, product_names.get(&item.product_id)))
            .collect();

        Ok(OrderDetail {
            order: map_order(&order_model),
            items,
            table: Some(TableSummary {
                id: table.id,
                table_number: table.table_number,
            }),
            customer: None,
        })
    }

    /// Fetch the bare order row (ownership checks, reconciliation).
    pub async fn get_order_row(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        let db = &*self.db_pool;
        OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Retrieves an order with items, table, and customer projections.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order_detail(
        &self,
        order_id: Uuid,
    ) -> Result<Option<OrderDetail>, ServiceError> {
        let db = &*self.db_pool;

        let Some(order_model) = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
        else {
            return Ok(None);
        };

        let mut details = self.assemble_details(vec![order_model]).await?;
        Ok(details.pop())
    }

    /// Lists orders, optionally filtered by customer and/or status, newest
    /// first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
    ) -> Result<Vec<OrderDetail>, ServiceError> {
        let db = &*self.db_pool;

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);

        if let Some(user_id) = filter.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status.to_string()));
        }

        let orders = query.all(db).await.map_err(|e| {
            error!(error = %e, "Failed to fetch orders");
            ServiceError::DatabaseError(e)
        })?;

        self.assemble_details(orders).await
    }

    /// Applies a partial update to an order (staff status changes, customer
    /// note edits, reconciliation writes).
    #[instrument(skip(self, fields), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        order_id: Uuid,
        fields: UpdateOrderFields,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let order_model = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = order_model.status.clone();

        let mut active: OrderActiveModel = order_model.into();
        if let Some(status) = fields.status {
            active.status = Set(status.to_string());
        }
        if let Some(payment_status) = fields.payment_status {
            active.payment_status = Set(payment_status.to_string());
        }
        if let Some(payment_method) = fields.payment_method {
            active.payment_method = Set(Some(payment_method));
        }
        if let Some(notes) = fields.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Some(now));

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %updated.status,
            "Order updated"
        );

        Ok(map_order(&updated))
    }

    /// Loads items/tables/profiles for a batch of orders in three queries and
    /// stitches the projections together.
    async fn assemble_details(
        &self,
        orders: Vec<OrderModel>,
    ) -> Result<Vec<OrderDetail>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let db = &*self.db_pool;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let table_ids: Vec<Uuid> = orders.iter().map(|o| o.table_id).collect();
        let user_ids: Vec<Uuid> = orders.iter().filter_map(|o| o.user_id).collect();

        let items: Vec<(OrderItemModel, Option<ProductModel>)> = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .find_also_related(ProductEntity)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let tables: HashMap<Uuid, TableModel> = TableEntity::find()
            .filter(crate::entities::dining_table::Column::Id.is_in(table_ids))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let profiles: HashMap<Uuid, crate::entities::profile::Model> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            ProfileEntity::find()
                .filter(crate::entities::profile::Column::Id.is_in(user_ids))
                .all(db)
                .await
                .map_err(ServiceError::DatabaseError)?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemResponse>> = HashMap::new();
        for (item, product) in items {
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(map_item(&item, product.as_ref()));
        }

        Ok(orders
            .into_iter()
            .map(|order_model| {
                let items = items_by_order.remove(&order_model.id).unwrap_or_default();
                let table = tables.get(&order_model.table_id).map(|t| TableSummary {
                    id: t.id,
                    table_number: t.table_number,
                });
                let customer = order_model
                    .user_id
                    .and_then(|uid| profiles.get(&uid))
                    .map(|p| CustomerSummary {
                        id: p.id,
                        full_name: p.full_name.clone(),
                        email: p.email.clone(),
                    });

                OrderDetail {
                    order: map_order(&order_model),
                    items,
                    table,
                    customer,
                }
            })
            .collect())
    }
}

fn map_order(model: &OrderModel) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number.clone(),
        gateway_order_id: model.gateway_order_id.clone(),
        table_id: model.table_id,
        user_id: model.user_id,
        total_amount: model.total_amount,
        status: model.status.clone(),
        payment_status: model.payment_status.clone(),
        payment_method: model.payment_method.clone(),
        gateway_transaction_id: model.gateway_transaction_id.clone(),
        notes: model.notes.clone(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn map_item(model: &OrderItemModel, product: Option<&ProductModel>) -> OrderItemResponse {
    OrderItemResponse {
        id: model.id,
        product_id: model.product_id,
        product_name: product.map(|p| p.name.clone()),
        product_image_url: product.and_then(|p| p.image_url.clone()),
        quantity: model.quantity,
        unit_price: model.unit_price,
        line_total: model.unit_price * Decimal::from(model.quantity),
        customizations: model.customizations.clone(),
        notes: model.notes.clone(),
    }
}
