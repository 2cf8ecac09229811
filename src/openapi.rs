use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tableside API",
        version = "0.1.0",
        description = r#"
# Tableside cashierless ordering API

Customers scan a per-table QR code, browse the menu, and pay through the
hosted payment page; staff manage orders, products, and tables through the
role-gated endpoints.

## Authentication

Customer-facing ordering endpoints accept anonymous (guest) requests. Staff
endpoints and order patches require a bearer token from the auth provider:

```
Authorization: Bearer <jwt>
```

## Rate limiting

The webhook and order-listing endpoints are rate limited per source IP and
answer `429` with `{"error": "Rate limit exceeded"}` once the window is
exhausted.
        "#
    ),
    tags(
        (name = "Orders", description = "Order creation and tracking"),
        (name = "Payments", description = "Payment session endpoints"),
        (name = "Webhooks", description = "Payment gateway notifications"),
        (name = "Tables", description = "Table and QR management"),
        (name = "Products", description = "Menu management")
    ),
    paths(
        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::create_order,
        crate::handlers::orders::update_order,

        // Payments
        crate::handlers::payments::create_session,

        // Webhooks
        crate::handlers::payment_webhooks::payment_webhook,

        // Catalog
        crate::handlers::tables::list_tables,
        crate::handlers::tables::get_table_by_number,
        crate::handlers::tables::create_table,
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::errors::ErrorResponse,

            // Order types
            crate::services::orders::CreateOrderInput,
            crate::services::orders::NewOrderItem,
            crate::services::orders::UpdateOrderFields,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderDetail,
            crate::services::orders::TableSummary,
            crate::services::orders::CustomerSummary,
            crate::models::OrderStatus,
            crate::models::PaymentStatus,

            // Payment types
            crate::services::payment_sessions::CreateSessionRequest,
            crate::services::payment_sessions::TransactionDetailsInput,
            crate::services::payment_sessions::CustomerDetails,
            crate::services::payment_sessions::SessionItemInput,
            crate::services::payment_sessions::CallbackOverrides,
            crate::services::payment_sessions::PaymentSession,
            crate::services::reconciliation::WebhookNotification,
            crate::models::TransactionStatus,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::handlers::payment_webhooks::WebhookOrderState,

            // Catalog types
            crate::services::catalog::CreateTableInput,
            crate::services::catalog::CreateProductInput,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
