pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod products;
pub mod tables;

use crate::config::AppConfig;
use crate::db::DbPool;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<crate::services::catalog::CatalogService>,
    pub orders: Arc<crate::services::orders::OrderService>,
    pub payment_sessions: Arc<crate::services::payment_sessions::PaymentSessionService>,
    pub reconciliation: Arc<crate::services::reconciliation::ReconciliationService>,
}

impl AppServices {
    /// Wire the service graph for the given pool and configuration.
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        let catalog = Arc::new(crate::services::catalog::CatalogService::new(
            db_pool.clone(),
        ));
        let orders = Arc::new(crate::services::orders::OrderService::new(
            db_pool.clone(),
            catalog.clone(),
        ));
        let payment_sessions = Arc::new(
            crate::services::payment_sessions::PaymentSessionService::from_config(
                config,
                catalog.clone(),
            ),
        );
        let reconciliation = Arc::new(crate::services::reconciliation::ReconciliationService::new(
            db_pool,
            config.payment_server_key.clone(),
            // Signature checking mirrors the gateway dashboard setting and is
            // only meaningful against the production keys.
            config.is_production(),
        ));

        Self {
            catalog,
            orders,
            payment_sessions,
            reconciliation,
        }
    }
}
