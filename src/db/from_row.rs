//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on bad database content.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, created_at";

pub const MEMBERSHIP_COLS: &str = "id, user_id, plan_name, billing_period_days, status, start_date, end_date, created_at, updated_at";

pub const PAYMENT_COLS: &str = "id, gateway_transaction_id, amount_cents, rail, purpose, status, user_id, membership_id, reference_id, reference_type, anonymous_client, transfer_proof, validated_by, validated_at, created_by, notes, created_at, updated_at";

pub const STORE_PRODUCT_COLS: &str =
    "id, name, sku, price_cents, stock_quantity, min_stock, active, created_at, updated_at";

pub const STORE_ORDER_COLS: &str = "id, user_id, status, payment_status, subtotal_cents, discount_cents, tax_cents, shipping_cents, total_cents, notes, created_at, updated_at";

pub const STORE_ORDER_ITEM_COLS: &str =
    "id, order_id, product_id, product_name, product_sku, unit_price_cents, quantity";

pub const CART_ITEM_COLS: &str = "id, user_id, product_id, quantity, created_at";

pub const MOVEMENT_COLS: &str = "id, movement_type, category, amount_cents, description, reference_id, reference_type, occurred_at, created_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for Membership {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Membership {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_name: row.get(2)?,
            billing_period_days: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            start_date: row.get(5)?,
            end_date: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            gateway_transaction_id: row.get(1)?,
            amount_cents: row.get(2)?,
            rail: parse_enum(row, 3, "rail")?,
            purpose: parse_enum(row, 4, "purpose")?,
            status: parse_enum(row, 5, "status")?,
            user_id: row.get(6)?,
            membership_id: row.get(7)?,
            reference_id: row.get(8)?,
            reference_type: row.get(9)?,
            anonymous_client: row.get(10)?,
            transfer_proof: row.get(11)?,
            validated_by: row.get(12)?,
            validated_at: row.get(13)?,
            created_by: row.get(14)?,
            notes: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

impl FromRow for StoreProduct {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(StoreProduct {
            id: row.get(0)?,
            name: row.get(1)?,
            sku: row.get(2)?,
            price_cents: row.get(3)?,
            stock_quantity: row.get(4)?,
            min_stock: row.get(5)?,
            active: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for StoreOrder {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(StoreOrder {
            id: row.get(0)?,
            user_id: row.get(1)?,
            status: parse_enum(row, 2, "status")?,
            payment_status: parse_enum(row, 3, "payment_status")?,
            subtotal_cents: row.get(4)?,
            discount_cents: row.get(5)?,
            tax_cents: row.get(6)?,
            shipping_cents: row.get(7)?,
            total_cents: row.get(8)?,
            notes: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for StoreOrderItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(StoreOrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            product_id: row.get(2)?,
            product_name: row.get(3)?,
            product_sku: row.get(4)?,
            unit_price_cents: row.get(5)?,
            quantity: row.get(6)?,
        })
    }
}

impl FromRow for CartItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CartItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            product_id: row.get(2)?,
            quantity: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for FinancialMovement {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(FinancialMovement {
            id: row.get(0)?,
            movement_type: parse_enum(row, 1, "movement_type")?,
            category: parse_enum(row, 2, "category")?,
            amount_cents: row.get(3)?,
            description: row.get(4)?,
            reference_id: row.get(5)?,
            reference_type: row.get(6)?,
            occurred_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
