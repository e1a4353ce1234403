//! Test utilities and fixtures for gymledger integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tempfile::TempDir;

pub use gymledger::db::{create_pool, init_db, queries, DbPool};
pub use gymledger::engine::ReconciliationEngine;
pub use gymledger::models::*;
pub use gymledger::notify::LogNotifier;

pub const DAY_SECS: i64 = 86_400;

/// A pooled on-disk database in a temp directory plus an engine wired to it.
/// The temp directory lives as long as the context.
pub struct TestContext {
    pub db: DbPool,
    pub engine: ReconciliationEngine,
    _dir: TempDir,
}

pub fn setup() -> TestContext {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test.db");
    let db = create_pool(path.to_str().expect("utf-8 path")).expect("Failed to create pool");
    {
        let conn = db.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    let engine = ReconciliationEngine::new(db.clone(), Arc::new(LogNotifier));
    TestContext {
        db,
        engine,
        _dir: dir,
    }
}

pub fn now() -> i64 {
    Utc::now().timestamp()
}

pub fn create_test_user(conn: &Connection, email: &str) -> User {
    queries::create_user(
        conn,
        &CreateUser {
            email: email.to_string(),
            name: format!("Test User {}", email),
        },
    )
    .expect("Failed to create test user")
}

/// Create a membership ending at `end_date` with a 30-day billing period.
pub fn create_test_membership(conn: &Connection, user_id: &str, end_date: i64) -> Membership {
    queries::create_membership(
        conn,
        &CreateMembership {
            user_id: user_id.to_string(),
            plan_name: "Monthly".to_string(),
            billing_period_days: 30,
            start_date: end_date - 30 * DAY_SECS,
            end_date,
        },
    )
    .expect("Failed to create test membership")
}

pub fn create_test_product(
    conn: &Connection,
    sku: &str,
    price_cents: i64,
    stock: i64,
) -> StoreProduct {
    queries::create_store_product(
        conn,
        &CreateStoreProduct {
            name: format!("Product {}", sku),
            sku: sku.to_string(),
            price_cents,
            stock_quantity: stock,
            min_stock: 2,
        },
    )
    .expect("Failed to create test product")
}

pub fn membership_refs(membership: &Membership) -> PaymentRefs {
    PaymentRefs {
        user_id: Some(membership.user_id.clone()),
        membership_id: Some(membership.id.clone()),
        ..Default::default()
    }
}

pub fn order_refs(order: &StoreOrder) -> PaymentRefs {
    PaymentRefs {
        user_id: order.user_id.clone(),
        reference_id: Some(order.id.clone()),
        reference_type: Some("store_order".to_string()),
        ..Default::default()
    }
}
