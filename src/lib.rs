//! Tableside API Library
//!
//! Backend for a cashierless cafe: per-table QR ordering, menu management,
//! payment sessions, and webhook reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod rate_limiter;
pub mod services;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use rate_limiter::{RateLimitBackend, RateLimitConfig, RateLimiter};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub rate_limits: RateLimits,
    pub redis: Arc<redis::Client>,
}

/// Per-endpoint rate limiters keyed by source IP.
///
/// The webhook endpoint and the order listing carry separate budgets; both
/// share the configured backend (process-local map, or Redis when the
/// deployment runs more than one instance).
#[derive(Clone)]
pub struct RateLimits {
    pub webhook: RateLimiter,
    pub orders: RateLimiter,
}

impl RateLimits {
    pub fn from_config(cfg: &config::AppConfig, redis: Option<Arc<redis::Client>>) -> Self {
        let backend_for = |scope: &str| match (&redis, cfg.rate_limit_use_redis) {
            (Some(client), true) => RateLimitBackend::Redis {
                client: client.clone(),
                namespace: format!("{}:{}", cfg.rate_limit_namespace, scope),
            },
            _ => RateLimitBackend::InMemory,
        };

        Self {
            webhook: RateLimiter::new(
                RateLimitConfig {
                    requests_per_window: cfg.webhook_rate_limit_requests,
                    window_duration: Duration::from_secs(cfg.webhook_rate_limit_window_seconds),
                },
                backend_for("webhook"),
            ),
            orders: RateLimiter::new(
                RateLimitConfig {
                    requests_per_window: cfg.orders_rate_limit_requests,
                    window_duration: Duration::from_secs(cfg.orders_rate_limit_window_seconds),
                },
                backend_for("orders"),
            ),
        }
    }
}

// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Ordering flow
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route(
            "/orders/:id",
            get(handlers::orders::get_order).patch(handlers::orders::update_order),
        )
        // Payment gateway integration
        .route(
            "/payment/create-session",
            post(handlers::payments::create_session),
        )
        .route(
            "/webhooks/payment",
            post(handlers::payment_webhooks::payment_webhook),
        )
        // Staff-managed catalog
        .route(
            "/tables",
            get(handlers::tables::list_tables).post(handlers::tables::create_table),
        )
        .route(
            "/tables/:table_number",
            get(handlers::tables::get_table_by_number),
        )
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "tableside-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    // Check database connectivity
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    // Check Redis connectivity (only load-bearing when the distributed rate
    // limiter is enabled)
    let redis_status = match state.redis.get_async_connection().await {
        Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => "healthy",
            Err(_) => "unhealthy",
        },
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": if db_status == "healthy" { "healthy" } else { "unhealthy" },
        "checks": {
            "database": db_status,
            "rate_limit_store": redis_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
