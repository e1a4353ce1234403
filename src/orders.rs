//! Store order creation and the stock reservation unit.
//!
//! Stock is checked and decremented at order-creation time, inside one
//! immediate (write-locking) transaction, so two orders racing on the same
//! low-stock product serialize instead of overselling. The whole reservation
//! is all-or-nothing: one short line fails the entire order before any
//! mutation is persisted.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{CreateOrder, OrderStatus, OrderWithItems, StoreOrder};

pub fn create_order(conn: &mut Connection, input: &CreateOrder) -> Result<OrderWithItems> {
    if input.items.is_empty() {
        return Err(AppError::Validation("order must contain at least one item".into()));
    }
    for line in &input.items {
        if line.quantity <= 0 {
            return Err(AppError::Validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
    }
    if input.discount_cents < 0 || input.tax_cents < 0 || input.shipping_cents < 0 {
        return Err(AppError::Validation(
            "discount, tax and shipping must not be negative".into(),
        ));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(user_id) = input.user_id.as_deref() {
        if queries::get_user_by_id(&tx, user_id)?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
    }

    // First pass: load every product and check stock before touching anything.
    let mut lines = Vec::with_capacity(input.items.len());
    for line in &input.items {
        let product = queries::get_store_product_by_id(&tx, &line.product_id)?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", line.product_id)))?;
        if !product.active {
            return Err(AppError::Validation(format!(
                "product {} is not available",
                product.sku
            )));
        }
        if product.stock_quantity < line.quantity {
            return Err(AppError::InsufficientStock(format!(
                "product {} has {} in stock, {} requested",
                product.sku, product.stock_quantity, line.quantity
            )));
        }
        lines.push((product, line.quantity));
    }

    let subtotal_cents: i64 = lines
        .iter()
        .map(|(product, qty)| product.price_cents * qty)
        .sum();

    if input.discount_cents > subtotal_cents {
        return Err(AppError::Validation("discount exceeds order subtotal".into()));
    }

    // Tax and shipping are caller-supplied and trusted; the only guard is the
    // sanity check that the total never drops below subtotal minus discount.
    let total_cents =
        subtotal_cents - input.discount_cents + input.tax_cents + input.shipping_cents;
    if total_cents < subtotal_cents - input.discount_cents {
        return Err(AppError::Validation(
            "order total is below subtotal minus discount".into(),
        ));
    }

    let order = queries::insert_order(
        &tx,
        input.user_id.as_deref(),
        &queries::NewOrderTotals {
            subtotal_cents,
            discount_cents: input.discount_cents,
            tax_cents: input.tax_cents,
            shipping_cents: input.shipping_cents,
            total_cents,
        },
        input.notes.as_deref(),
    )?;

    // Second pass: snapshot items and reserve stock. The guarded decrement is
    // a backstop; inside this write transaction the first-pass check holds.
    let mut items = Vec::with_capacity(lines.len());
    let mut low_stock_skus = Vec::new();
    for (product, quantity) in &lines {
        items.push(queries::insert_order_item(&tx, &order.id, product, *quantity)?);
        if !queries::decrement_stock(&tx, &product.id, *quantity)? {
            return Err(AppError::InsufficientStock(format!(
                "product {} ran out of stock during reservation",
                product.sku
            )));
        }
        if product.stock_quantity - quantity <= product.min_stock {
            low_stock_skus.push(product.sku.clone());
        }
    }

    tx.commit()?;

    if !low_stock_skus.is_empty() {
        tracing::warn!(order_id = %order.id, skus = ?low_stock_skus, "products at or below reorder threshold");
    }

    Ok(OrderWithItems {
        order,
        items,
        low_stock_skus,
    })
}

/// Cancel an order and put its reserved stock back. An explicit staff action,
/// not an automatic consequence of payment failure.
pub fn cancel_order(conn: &mut Connection, order_id: &str) -> Result<StoreOrder> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let order = queries::get_order_by_id(&tx, order_id)?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

    if !queries::cancel_order(&tx, order_id)? {
        return Err(AppError::InvalidState(format!(
            "order {} is already {}",
            order_id, order.status
        )));
    }

    restore_stock_for_order(&tx, order_id)?;

    let cancelled = queries::get_order_by_id(&tx, order_id)?
        .ok_or_else(|| AppError::Internal("order vanished during cancellation".into()))?;
    tx.commit()?;

    debug_assert_eq!(cancelled.status, OrderStatus::Cancelled);
    Ok(cancelled)
}

/// Inverse of the reservation: add each item's quantity back onto its product.
pub fn restore_stock_for_order(conn: &Connection, order_id: &str) -> Result<()> {
    for item in queries::list_order_items(conn, order_id)? {
        queries::increment_stock(conn, &item.product_id, item.quantity)?;
    }
    Ok(())
}
