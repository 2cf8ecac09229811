use crate::{config::AppConfig, errors::ServiceError, services::catalog::CatalogService};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Path of the hosted-payment-page transaction endpoint on the gateway.
const SNAP_TRANSACTIONS_PATH: &str = "/snap/v1/transactions";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub transaction_details: Option<TransactionDetailsInput>,
    pub customer_details: Option<CustomerDetails>,
    pub item_details: Option<Vec<SessionItemInput>>,
    pub callbacks: Option<CallbackOverrides>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransactionDetailsInput {
    /// Gateway correlation id; the storefront passes the order number here.
    pub order_id: String,
    pub gross_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Line item as submitted by the storefront cart. Field names vary between
/// the cart store and the order projection, so both spellings are accepted
/// and normalized during backfill.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SessionItemInput {
    pub id: Option<String>,
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub product_name: Option<String>,
    pub price: Option<Decimal>,
    pub product_price: Option<Decimal>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackOverrides {
    pub finish: Option<String>,
    pub unfinish: Option<String>,
    pub error: Option<String>,
}

/// Opaque session handle returned by the gateway; the storefront redirects
/// the customer to `redirect_url` (or feeds `token` to the embedded widget).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentSession {
    pub token: String,
    pub redirect_url: String,
}

// Wire types for the gateway request.

#[derive(Debug, Serialize)]
struct SnapTransactionRequest {
    transaction_details: SnapTransactionDetails,
    customer_details: CustomerDetails,
    item_details: Vec<SnapItemDetail>,
    callbacks: SnapCallbacks,
    credit_card: SnapCreditCard,
}

#[derive(Debug, Serialize)]
struct SnapTransactionDetails {
    order_id: String,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct SnapItemDetail {
    id: String,
    price: i64,
    quantity: i32,
    name: String,
}

#[derive(Debug, Serialize)]
struct SnapCallbacks {
    finish: String,
    unfinish: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct SnapCreditCard {
    secure: bool,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error_messages: Option<Vec<String>>,
}

/// Builds the HTTP Basic credential the gateway expects: the server key as
/// username with an empty password.
fn basic_auth_header(server_key: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:", server_key)))
}

/// Client for the payment gateway's hosted payment page API.
///
/// Obtains a redirect/token session for a pending order. Stateless apart from
/// the shared HTTP connection pool.
#[derive(Clone)]
pub struct PaymentSessionService {
    http: reqwest::Client,
    catalog: Arc<CatalogService>,
    server_key: Option<String>,
    api_base: String,
    public_base_url: String,
}

impl PaymentSessionService {
    pub fn from_config(config: &AppConfig, catalog: Arc<CatalogService>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http,
            catalog,
            server_key: config.payment_server_key.clone(),
            api_base: config.payment_api_base().to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Requests a payment session from the gateway for a pending order.
    #[instrument(skip(self, request))]
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let transaction = request.transaction_details.ok_or_else(|| {
            ServiceError::ValidationError("Missing required transaction details".to_string())
        })?;

        if transaction.order_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Missing required transaction details".to_string(),
            ));
        }

        let gross_amount = transaction
            .gross_amount
            .trunc()
            .to_i64()
            .filter(|amount| *amount > 0)
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "Missing required transaction details".to_string(),
                )
            })?;

        let server_key = self.server_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            error!("Payment gateway server key is not configured");
            ServiceError::PaymentConfigError("payment gateway server key missing".to_string())
        })?;

        let item_details = self
            .normalize_items(request.item_details.unwrap_or_default())
            .await?;

        let customer_details = request.customer_details.unwrap_or(CustomerDetails {
            first_name: Some("Customer".to_string()),
            last_name: None,
            email: Some("customer@example.com".to_string()),
            phone: Some("08123456789".to_string()),
        });

        let callbacks = request.callbacks.unwrap_or(CallbackOverrides {
            finish: None,
            unfinish: None,
            error: None,
        });

        let payload = SnapTransactionRequest {
            transaction_details: SnapTransactionDetails {
                order_id: transaction.order_id.clone(),
                gross_amount,
            },
            customer_details,
            item_details,
            callbacks: SnapCallbacks {
                finish: callbacks
                    .finish
                    .unwrap_or_else(|| format!("{}/payment/success", self.public_base_url)),
                unfinish: callbacks
                    .unfinish
                    .unwrap_or_else(|| format!("{}/payment/pending", self.public_base_url)),
                error: callbacks
                    .error
                    .unwrap_or_else(|| format!("{}/payment/error", self.public_base_url)),
            },
            credit_card: SnapCreditCard { secure: true },
        };

        let url = format!("{}{}", self.api_base, SNAP_TRANSACTIONS_PATH);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::AUTHORIZATION, basic_auth_header(&server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Payment gateway request failed");
                ServiceError::PaymentGatewayError("Failed to create payment token".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                order_id = %transaction.order_id,
                "Payment gateway rejected session request"
            );

            let message = serde_json::from_str::<GatewayErrorBody>(&body)
                .ok()
                .and_then(|err| err.error_messages)
                .filter(|messages| !messages.is_empty())
                .map(|messages| messages.join(", "))
                .unwrap_or_else(|| {
                    if body.is_empty() {
                        "Failed to create payment token".to_string()
                    } else {
                        body
                    }
                });

            return Err(ServiceError::PaymentGatewayError(message));
        }

        let session: PaymentSession = response.json().await.map_err(|e| {
            error!(error = %e, "Payment gateway returned an unreadable session response");
            ServiceError::PaymentGatewayError("Failed to create payment token".to_string())
        })?;

        info!(order_id = %transaction.order_id, "Payment session created");

        Ok(session)
    }

    /// Normalizes cart line items and backfills missing names/prices from the
    /// product catalog, since the storefront cart sometimes sends a bare
    /// product id.
    async fn normalize_items(
        &self,
        items: Vec<SessionItemInput>,
    ) -> Result<Vec<SnapItemDetail>, ServiceError> {
        let mut normalized = Vec::with_capacity(items.len());

        for item in items {
            let id = item
                .id
                .or(item.product_id)
                .unwrap_or_default();
            let mut name = item.name.or(item.product_name);
            let mut price = item.price.or(item.product_price).filter(|p| !p.is_zero());

            if name.is_none() || price.is_none() {
                if let Ok(product_id) = Uuid::parse_str(&id) {
                    if let Some(product) = self.catalog.get_product(product_id).await? {
                        name = name.or(Some(product.name));
                        price = price.or(Some(product.price));
                    }
                }
            }

            normalized.push(SnapItemDetail {
                id,
                price: price
                    .and_then(|p| p.trunc().to_i64())
                    .unwrap_or(0),
                quantity: item.quantity.unwrap_or(1),
                name: name.unwrap_or_default(),
            });
        }

        Ok(normalized)
    }
}
