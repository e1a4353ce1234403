//! Side effects of a payment reaching `completed`: ledger entry, membership
//! activation, order fulfillment, cart clearing.
//!
//! All of these run inside the same transaction as the status transition.
//! Failures here roll the whole transition back; a payment is never marked
//! completed with its correctness-critical effects missing.

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{
    FinancialMovement, MovementCategory, MovementType, Payment, PaymentPurpose, PaymentStatus,
};

/// `reference_type` value movements use to point back at their payment.
pub const REF_TYPE_PAYMENT: &str = "payment";

/// `reference_type` value payments use to point at a store order.
pub const REF_TYPE_STORE_ORDER: &str = "store_order";

const SECS_PER_DAY: i64 = 86_400;

/// Run every completion effect for a payment that just transitioned to
/// `completed`. Dispatch is exhaustive over the purpose enum and uniform
/// across rails: a membership paid in cash renews exactly like one paid
/// through the gateway.
pub fn run_completion_effects(conn: &Connection, payment: &Payment) -> Result<()> {
    record_from_payment(conn, payment)?;

    match payment.purpose {
        PaymentPurpose::Membership => match payment.membership_id.as_deref() {
            Some(membership_id) => activate_or_renew(conn, membership_id)?,
            None => {
                tracing::warn!(
                    payment_id = %payment.id,
                    "completed membership payment carries no membership id; nothing to activate"
                );
            }
        },
        PaymentPurpose::StoreOrder => fulfill_order(conn, payment)?,
        PaymentPurpose::DailyEntry | PaymentPurpose::Other => {}
    }

    Ok(())
}

/// Idempotent ledger write: at most one movement per (payment, "payment")
/// pair. The unique constraint is the authoritative guard; a constraint hit
/// means another writer already recorded the movement, and we return that row.
pub fn record_from_payment(conn: &Connection, payment: &Payment) -> Result<FinancialMovement> {
    if payment.status != PaymentStatus::Completed {
        return Err(AppError::Internal(format!(
            "refusing to record movement for {} payment {}",
            payment.status, payment.id
        )));
    }

    let input = queries::NewMovement {
        movement_type: MovementType::Income,
        category: MovementCategory::from_purpose(payment.purpose),
        amount_cents: payment.amount_cents,
        description: Some(payment.purpose.as_str()),
        reference_id: &payment.id,
        reference_type: REF_TYPE_PAYMENT,
        occurred_at: Utc::now().timestamp(),
    };

    match queries::insert_movement(conn, &input) {
        Ok(movement) => Ok(movement),
        Err(AppError::Database(ref e)) if queries::is_unique_violation(e) => {
            tracing::info!(
                payment_id = %payment.id,
                "financial movement already recorded, returning existing row"
            );
            queries::get_movement_by_reference(conn, &payment.id, REF_TYPE_PAYMENT)?.ok_or_else(
                || AppError::Internal("movement vanished after unique-constraint hit".into()),
            )
        }
        Err(e) => Err(e),
    }
}

/// Activate a membership, extending an already-expired one by a single
/// billing period counted from today. Late payers are not back-dated, and a
/// membership still in the future keeps its end date: this hook is not the
/// general renewal mechanism.
pub fn activate_or_renew(conn: &Connection, membership_id: &str) -> Result<()> {
    let membership = queries::get_membership_by_id(conn, membership_id)?
        .ok_or_else(|| AppError::NotFound(format!("Membership {} not found", membership_id)))?;

    let now = Utc::now().timestamp();
    let new_end_date = if membership.end_date < now {
        Some(now + membership.billing_period_days * SECS_PER_DAY)
    } else {
        None
    };

    queries::activate_membership(conn, membership_id, new_end_date)?;
    tracing::info!(
        membership_id = %membership_id,
        extended = new_end_date.is_some(),
        "membership activated"
    );
    Ok(())
}

/// Mark the referenced store order paid and clear the payer's pending cart.
fn fulfill_order(conn: &Connection, payment: &Payment) -> Result<()> {
    match (payment.reference_type.as_deref(), payment.reference_id.as_deref()) {
        (Some(REF_TYPE_STORE_ORDER), Some(order_id)) => {
            if !queries::mark_order_paid(conn, order_id)? {
                return Err(AppError::NotFound(format!("Order {} not found", order_id)));
            }
            if let Some(user_id) = payment.user_id.as_deref() {
                let cleared = queries::clear_cart(conn, user_id)?;
                if cleared > 0 {
                    tracing::debug!(user_id = %user_id, cleared, "cart cleared after order payment");
                }
            }
            Ok(())
        }
        _ => {
            tracing::warn!(
                payment_id = %payment.id,
                "completed store_order payment carries no order reference; nothing to fulfill"
            );
            Ok(())
        }
    }
}
