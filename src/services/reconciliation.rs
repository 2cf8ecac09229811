use crate::{
    db::DbPool,
    entities::order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel},
    errors::ServiceError,
    models::{map_gateway_status, PaymentStatus, TransactionStatus},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Asynchronous status push from the payment gateway.
///
/// Exists only for the duration of one request; its entire effect is an order
/// mutation. Unknown `transaction_status` values fail deserialization, which
/// the handler reports as a malformed payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookNotification {
    /// Gateway-side correlation id (the order number for orders created here).
    pub order_id: String,
    pub status_code: String,
    /// Amount as the gateway formats it (string, two decimal places); feeds
    /// the signature check verbatim.
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: TransactionStatus,
    pub fraud_status: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_type: Option<String>,
}

/// Result of reconciling one notification against the order store.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutcome {
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    /// True when the idempotency guard short-circuited a duplicate delivery.
    pub already_processed: bool,
    /// True when the order row was actually written.
    pub changed: bool,
}

/// Salted one-way hash the gateway sends alongside each notification:
/// sha512(order_id ++ status_code ++ gross_amount ++ server_key), hex-encoded.
pub fn expected_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// The correlation keys tried when resolving a notification to an order, in
/// priority order. The first strategy that produces a row wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupStrategy {
    OrderNumber,
    GatewayReference,
    PrimaryKey,
}

const LOOKUP_SEQUENCE: [LookupStrategy; 3] = [
    LookupStrategy::OrderNumber,
    LookupStrategy::GatewayReference,
    LookupStrategy::PrimaryKey,
];

impl LookupStrategy {
    async fn find(&self, db: &DbPool, key: &str) -> Result<Option<OrderModel>, ServiceError> {
        let query = match self {
            LookupStrategy::OrderNumber => {
                OrderEntity::find().filter(order::Column::OrderNumber.eq(key))
            }
            LookupStrategy::GatewayReference => {
                OrderEntity::find().filter(order::Column::GatewayOrderId.eq(key))
            }
            LookupStrategy::PrimaryKey => {
                let Ok(id) = Uuid::parse_str(key) else {
                    return Ok(None);
                };
                OrderEntity::find().filter(order::Column::Id.eq(id))
            }
        };

        query.one(db).await.map_err(ServiceError::DatabaseError)
    }
}

/// Converges an order onto the state reported by the payment gateway.
///
/// Processing is idempotent for the paid terminal state: a duplicate
/// settlement delivery answers success without touching the row, which keeps
/// the gateway from retrying forever.
#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
    server_key: Option<String>,
    /// Signature checking is skipped entirely outside production.
    verify_signatures: bool,
}

impl ReconciliationService {
    pub fn new(db_pool: Arc<DbPool>, server_key: Option<String>, verify_signatures: bool) -> Self {
        Self {
            db_pool,
            server_key,
            verify_signatures,
        }
    }

    /// Applies one gateway notification to the referenced order.
    #[instrument(skip(self, notification), fields(order_id = %notification.order_id, transaction_status = %notification.transaction_status))]
    pub async fn process(
        &self,
        notification: WebhookNotification,
        client_ip: &str,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        if notification.order_id.trim().is_empty() {
            return Err(ServiceError::BadRequest("Invalid order_id".to_string()));
        }

        self.check_signature(&notification, client_ip);

        let mapped = map_gateway_status(
            notification.transaction_status,
            notification.fraud_status.as_deref(),
        );

        let target = self.resolve_order(&notification.order_id).await?.ok_or_else(|| {
            warn!(order_id = %notification.order_id, client_ip, "Webhook references unknown order");
            ServiceError::NotFound("Order not found".to_string())
        })?;

        let Some((payment_status, order_status)) = mapped else {
            info!(
                order_number = %target.order_number,
                fraud_status = ?notification.fraud_status,
                "Notification did not map to a status change; order left untouched"
            );
            return Ok(ReconciliationOutcome {
                order_number: target.order_number,
                status: target.status,
                payment_status: target.payment_status,
                already_processed: false,
                changed: false,
            });
        };

        // Idempotency guard: a repeat settlement for an already-paid order is
        // acknowledged without reprocessing.
        if target.payment_status == PaymentStatus::Paid.to_string()
            && payment_status == PaymentStatus::Paid
        {
            warn!(
                order_number = %target.order_number,
                client_ip,
                "Duplicate webhook for paid order"
            );
            return Ok(ReconciliationOutcome {
                order_number: target.order_number,
                status: target.status,
                payment_status: target.payment_status,
                already_processed: true,
                changed: false,
            });
        }

        let order_number = target.order_number.clone();
        let previous_status = target.status.clone();
        let previous_payment_status = target.payment_status.clone();

        let mut active: OrderActiveModel = target.into();
        active.payment_status = Set(payment_status.to_string());
        active.status = Set(order_status.to_string());
        active.gateway_transaction_id = Set(notification.transaction_id.clone());
        active.payment_method = Set(notification.payment_type.clone());
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, order_number = %order_number, client_ip, "Failed to update order from webhook");
            ServiceError::DatabaseError(e)
        })?;

        // Audit trail of the transition; staff dashboards page through these.
        info!(
            order_number = %updated.order_number,
            previous_status = %previous_status,
            previous_payment_status = %previous_payment_status,
            new_status = %updated.status,
            new_payment_status = %updated.payment_status,
            payment_type = ?notification.payment_type,
            client_ip,
            "Order reconciled from payment webhook"
        );

        Ok(ReconciliationOutcome {
            order_number: updated.order_number,
            status: updated.status,
            payment_status: updated.payment_status,
            already_processed: false,
            changed: true,
        })
    }

    /// Verifies the notification signature when enabled.
    ///
    /// A mismatch is logged as a security event but does not stop processing;
    /// the gateway contract treats the signature as advisory for now.
    fn check_signature(&self, notification: &WebhookNotification, client_ip: &str) {
        if !self.verify_signatures {
            debug!("Signature verification disabled for this environment");
            return;
        }

        let Some(server_key) = self.server_key.as_deref().filter(|k| !k.is_empty()) else {
            warn!("Webhook signature verification skipped: server key not configured");
            return;
        };

        let expected = expected_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            server_key,
        );

        if expected != notification.signature_key {
            warn!(
                order_id = %notification.order_id,
                client_ip,
                "Webhook signature mismatch; continuing with processing"
            );
        } else {
            debug!(order_id = %notification.order_id, "Webhook signature verified");
        }
    }

    /// Resolves the target order by trying each correlation key in turn.
    async fn resolve_order(&self, key: &str) -> Result<Option<OrderModel>, ServiceError> {
        let db = &*self.db_pool;

        for strategy in LOOKUP_SEQUENCE {
            if let Some(order_model) = strategy.find(db, key).await? {
                debug!(?strategy, order_id = %order_model.id, "Webhook order resolved");
                return Ok(Some(order_model));
            }
        }

        Ok(None)
    }
}
