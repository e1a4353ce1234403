mod schema;
pub mod from_row;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::engine::ReconciliationEngine;
use crate::gateway::GatewayClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool and the injected services.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Owns the payment state machine; all four rails funnel through it.
    pub engine: Arc<ReconciliationEngine>,
    /// Outbound client for the external card-payment gateway.
    pub gateway: Arc<GatewayClient>,
    /// Base URL for client-facing callbacks.
    pub base_url: String,
    /// ISO 4217 currency code sent to the gateway (lowercase).
    pub currency: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
