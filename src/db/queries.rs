use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    query_all, query_one, CART_ITEM_COLS, MEMBERSHIP_COLS, MOVEMENT_COLS, PAYMENT_COLS,
    STORE_ORDER_COLS, STORE_ORDER_ITEM_COLS, STORE_PRODUCT_COLS, USER_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// True when an insert lost a race on a unique constraint.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser) -> Result<User> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&id, &email, &input.name, now],
    )?;

    Ok(User {
        id,
        email,
        name: input.name.clone(),
        created_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

// ============ Memberships ============

pub fn create_membership(conn: &Connection, input: &CreateMembership) -> Result<Membership> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO memberships (id, user_id, plan_name, billing_period_days, status, start_date, end_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            &input.user_id,
            &input.plan_name,
            input.billing_period_days,
            MembershipStatus::Pending.as_str(),
            input.start_date,
            input.end_date,
            now,
            now
        ],
    )?;

    Ok(Membership {
        id,
        user_id: input.user_id.clone(),
        plan_name: input.plan_name.clone(),
        billing_period_days: input.billing_period_days,
        status: MembershipStatus::Pending,
        start_date: input.start_date,
        end_date: input.end_date,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_membership_by_id(conn: &Connection, id: &str) -> Result<Option<Membership>> {
    query_one(
        conn,
        &format!("SELECT {} FROM memberships WHERE id = ?1", MEMBERSHIP_COLS),
        &[&id],
    )
}

/// Activate a membership, optionally moving its end date forward.
pub fn activate_membership(
    conn: &Connection,
    id: &str,
    new_end_date: Option<i64>,
) -> Result<bool> {
    let affected = match new_end_date {
        Some(end) => conn.execute(
            "UPDATE memberships SET status = 'active', end_date = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, end, now()],
        )?,
        None => conn.execute(
            "UPDATE memberships SET status = 'active', updated_at = ?2 WHERE id = ?1",
            params![id, now()],
        )?,
    };
    Ok(affected > 0)
}

// ============ Payments ============

pub fn insert_payment(conn: &Connection, input: &CreatePayment) -> Result<Payment> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO payments (id, gateway_transaction_id, amount_cents, rail, purpose, status,
                               user_id, membership_id, reference_id, reference_type,
                               anonymous_client, created_by, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            &id,
            &input.gateway_transaction_id,
            input.amount_cents,
            input.rail.as_str(),
            input.purpose.as_str(),
            input.status.as_str(),
            &input.refs.user_id,
            &input.refs.membership_id,
            &input.refs.reference_id,
            &input.refs.reference_type,
            &input.refs.anonymous_client,
            &input.created_by,
            &input.notes,
            now,
            now
        ],
    )?;

    Ok(Payment {
        id,
        gateway_transaction_id: input.gateway_transaction_id.clone(),
        amount_cents: input.amount_cents,
        rail: input.rail,
        purpose: input.purpose,
        status: input.status,
        user_id: input.refs.user_id.clone(),
        membership_id: input.refs.membership_id.clone(),
        reference_id: input.refs.reference_id.clone(),
        reference_type: input.refs.reference_type.clone(),
        anonymous_client: input.refs.anonymous_client.clone(),
        transfer_proof: None,
        validated_by: None,
        validated_at: None,
        created_by: input.created_by.clone(),
        notes: input.notes.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment_by_id(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

pub fn get_payment_by_gateway_txn(
    conn: &Connection,
    gateway_transaction_id: &str,
) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE gateway_transaction_id = ?1",
            PAYMENT_COLS
        ),
        &[&gateway_transaction_id],
    )
}

pub fn list_payments(conn: &Connection, limit: i64) -> Result<Vec<Payment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payments ORDER BY created_at DESC, id DESC LIMIT ?1",
            PAYMENT_COLS
        ),
        &[&limit],
    )
}

/// Pending transfer payments, oldest first, for the validation queue.
pub fn list_pending_transfers(conn: &Connection) -> Result<Vec<Payment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE rail = 'transfer' AND status = 'pending'
             ORDER BY created_at ASC, id ASC",
            PAYMENT_COLS
        ),
        &[],
    )
}

/// Store a proof-of-transfer pointer and re-affirm pending status.
pub fn set_transfer_proof(conn: &Connection, id: &str, proof: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET transfer_proof = ?2, status = 'pending', updated_at = ?3 WHERE id = ?1",
        params![id, proof, now()],
    )?;
    Ok(affected > 0)
}

/// Compare-and-swap resolution of a transfer payment.
///
/// The `status = 'pending'` guard makes concurrent resolutions race safely:
/// exactly one caller observes an affected row.
pub fn cas_resolve_transfer(
    conn: &Connection,
    id: &str,
    new_status: PaymentStatus,
    validator_id: &str,
    notes: Option<&str>,
) -> Result<bool> {
    let ts = now();
    let affected = conn.execute(
        "UPDATE payments SET status = ?2, validated_by = ?3, validated_at = ?4,
                notes = COALESCE(?5, notes), updated_at = ?4
         WHERE id = ?1 AND status = 'pending'",
        params![id, new_status.as_str(), validator_id, ts, notes],
    )?;
    Ok(affected > 0)
}

/// Move a still-pending gateway payment to a terminal status.
/// Completed payments are left untouched (no transition leaves completed
/// except the administrative refund).
pub fn cas_update_gateway_payment_status(
    conn: &Connection,
    gateway_transaction_id: &str,
    new_status: PaymentStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = ?2, updated_at = ?3
         WHERE gateway_transaction_id = ?1 AND status = 'pending'",
        params![gateway_transaction_id, new_status.as_str(), now()],
    )?;
    Ok(affected > 0)
}

// ============ Store products ============

pub fn create_store_product(conn: &Connection, input: &CreateStoreProduct) -> Result<StoreProduct> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO store_products (id, name, sku, price_cents, stock_quantity, min_stock, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
        params![
            &id,
            &input.name,
            &input.sku,
            input.price_cents,
            input.stock_quantity,
            input.min_stock,
            now,
            now
        ],
    )?;

    Ok(StoreProduct {
        id,
        name: input.name.clone(),
        sku: input.sku.clone(),
        price_cents: input.price_cents,
        stock_quantity: input.stock_quantity,
        min_stock: input.min_stock,
        active: true,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_store_product_by_id(conn: &Connection, id: &str) -> Result<Option<StoreProduct>> {
    query_one(
        conn,
        &format!("SELECT {} FROM store_products WHERE id = ?1", STORE_PRODUCT_COLS),
        &[&id],
    )
}

/// Guarded decrement: only succeeds when enough stock remains, so two orders
/// racing on the same low-stock product cannot both win.
pub fn decrement_stock(conn: &Connection, product_id: &str, quantity: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE store_products SET stock_quantity = stock_quantity - ?2, updated_at = ?3
         WHERE id = ?1 AND stock_quantity >= ?2",
        params![product_id, quantity, now()],
    )?;
    Ok(affected > 0)
}

pub fn increment_stock(conn: &Connection, product_id: &str, quantity: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE store_products SET stock_quantity = stock_quantity + ?2, updated_at = ?3
         WHERE id = ?1",
        params![product_id, quantity, now()],
    )?;
    Ok(affected > 0)
}

// ============ Store orders ============

pub struct NewOrderTotals {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

pub fn insert_order(
    conn: &Connection,
    user_id: Option<&str>,
    totals: &NewOrderTotals,
    notes: Option<&str>,
) -> Result<StoreOrder> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO store_orders (id, user_id, status, payment_status, subtotal_cents, discount_cents,
                                   tax_cents, shipping_cents, total_cents, notes, created_at, updated_at)
         VALUES (?1, ?2, 'pending', 'pending', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &id,
            user_id,
            totals.subtotal_cents,
            totals.discount_cents,
            totals.tax_cents,
            totals.shipping_cents,
            totals.total_cents,
            notes,
            now,
            now
        ],
    )?;

    Ok(StoreOrder {
        id,
        user_id: user_id.map(str::to_string),
        status: OrderStatus::Pending,
        payment_status: OrderPaymentStatus::Pending,
        subtotal_cents: totals.subtotal_cents,
        discount_cents: totals.discount_cents,
        tax_cents: totals.tax_cents,
        shipping_cents: totals.shipping_cents,
        total_cents: totals.total_cents,
        notes: notes.map(str::to_string),
        created_at: now,
        updated_at: now,
    })
}

pub fn insert_order_item(
    conn: &Connection,
    order_id: &str,
    product: &StoreProduct,
    quantity: i64,
) -> Result<StoreOrderItem> {
    let id = gen_id();

    conn.execute(
        "INSERT INTO store_order_items (id, order_id, product_id, product_name, product_sku, unit_price_cents, quantity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            order_id,
            &product.id,
            &product.name,
            &product.sku,
            product.price_cents,
            quantity
        ],
    )?;

    Ok(StoreOrderItem {
        id,
        order_id: order_id.to_string(),
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        product_sku: product.sku.clone(),
        unit_price_cents: product.price_cents,
        quantity,
    })
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<StoreOrder>> {
    query_one(
        conn,
        &format!("SELECT {} FROM store_orders WHERE id = ?1", STORE_ORDER_COLS),
        &[&id],
    )
}

pub fn list_order_items(conn: &Connection, order_id: &str) -> Result<Vec<StoreOrderItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM store_order_items WHERE order_id = ?1",
            STORE_ORDER_ITEM_COLS
        ),
        &[&order_id],
    )
}

pub fn mark_order_paid(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE store_orders SET payment_status = 'paid', updated_at = ?2 WHERE id = ?1",
        params![order_id, now()],
    )?;
    Ok(affected > 0)
}

pub fn cancel_order(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE store_orders SET status = 'cancelled', updated_at = ?2
         WHERE id = ?1 AND status NOT IN ('delivered', 'cancelled')",
        params![order_id, now()],
    )?;
    Ok(affected > 0)
}

// ============ Cart ============

pub fn add_cart_item(
    conn: &Connection,
    user_id: &str,
    product_id: &str,
    quantity: i64,
) -> Result<CartItem> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO cart_items (id, user_id, product_id, quantity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity",
        params![&id, user_id, product_id, quantity, now],
    )?;

    Ok(CartItem {
        id,
        user_id: user_id.to_string(),
        product_id: product_id.to_string(),
        quantity,
        created_at: now,
    })
}

pub fn list_cart_items(conn: &Connection, user_id: &str) -> Result<Vec<CartItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM cart_items WHERE user_id = ?1 ORDER BY created_at ASC",
            CART_ITEM_COLS
        ),
        &[&user_id],
    )
}

pub fn clear_cart(conn: &Connection, user_id: &str) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM cart_items WHERE user_id = ?1", params![user_id])?;
    Ok(deleted)
}

// ============ Financial movements ============

pub struct NewMovement<'a> {
    pub movement_type: MovementType,
    pub category: MovementCategory,
    pub amount_cents: i64,
    pub description: Option<&'a str>,
    pub reference_id: &'a str,
    pub reference_type: &'a str,
    pub occurred_at: i64,
}

/// Raw insert; callers handle the unique-constraint race via
/// [`is_unique_violation`].
pub fn insert_movement(conn: &Connection, input: &NewMovement) -> Result<FinancialMovement> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO financial_movements (id, movement_type, category, amount_cents, description,
                                          reference_id, reference_type, occurred_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            input.movement_type.as_str(),
            input.category.as_str(),
            input.amount_cents,
            input.description,
            input.reference_id,
            input.reference_type,
            input.occurred_at,
            now
        ],
    )?;

    Ok(FinancialMovement {
        id,
        movement_type: input.movement_type,
        category: input.category,
        amount_cents: input.amount_cents,
        description: input.description.map(str::to_string),
        reference_id: input.reference_id.to_string(),
        reference_type: input.reference_type.to_string(),
        occurred_at: input.occurred_at,
        created_at: now,
    })
}

pub fn get_movement_by_reference(
    conn: &Connection,
    reference_id: &str,
    reference_type: &str,
) -> Result<Option<FinancialMovement>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM financial_movements WHERE reference_id = ?1 AND reference_type = ?2",
            MOVEMENT_COLS
        ),
        &[&reference_id, &reference_type],
    )
}

pub fn count_movements(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM financial_movements", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

// ============ Webhook events ============

pub fn webhook_event_seen(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM webhook_events WHERE provider = ?1 AND event_id = ?2",
        params![provider, event_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Record a webhook delivery. Returns false when this (provider, event_id)
/// pair has been seen before.
pub fn record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO webhook_events (id, provider, event_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![gen_id(), provider, event_id, now()],
    );
    match result {
        Ok(_) => Ok(true),
        Err(ref e) if is_unique_violation(e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
