//! Payment reconciliation engine.
//!
//! Owns the payment state machine. All four rails (cash, in-person card,
//! bank transfer, card gateway) funnel through this module; completion side
//! effects (ledger entry, membership activation, order fulfillment) run in
//! the same transaction as the status transition, so a payment is either
//! fully reconciled or not recorded at all.

pub mod effects;
pub mod transfers;

use std::sync::Arc;

use rusqlite::TransactionBehavior;

use crate::db::{queries, DbPool};
use crate::error::{AppError, Result};
use crate::models::{
    CreatePayment, Payment, PaymentPurpose, PaymentRail, PaymentRefs, PaymentStatus,
};
use crate::notify::Notifier;

pub use effects::{REF_TYPE_PAYMENT, REF_TYPE_STORE_ORDER};
pub use transfers::{TransferQueue, TransferQueueEntry};

/// Input for registering a cash or in-person card payment.
#[derive(Debug, Clone)]
pub struct RegisterImmediatePayment {
    pub rail: PaymentRail,
    pub amount_cents: i64,
    pub purpose: PaymentPurpose,
    pub refs: PaymentRefs,
    pub actor_id: Option<String>,
    pub notes: Option<String>,
}

/// Input for registering a pending bank-transfer payment.
#[derive(Debug, Clone)]
pub struct RegisterTransferPayment {
    pub amount_cents: i64,
    pub purpose: PaymentPurpose,
    pub refs: PaymentRefs,
    pub actor_id: Option<String>,
    pub notes: Option<String>,
}

/// Input for confirming a gateway payment. The metadata fields were attached
/// to the intent at creation time and are the only channel connecting the
/// gateway transaction back to domain objects.
#[derive(Debug, Clone)]
pub struct ConfirmGatewayPayment {
    pub gateway_transaction_id: String,
    pub amount_cents: i64,
    pub purpose: PaymentPurpose,
    pub refs: PaymentRefs,
}

/// Result of a gateway confirmation. `replayed` is true when the transaction
/// id had already been booked; the returned payment is then the existing row.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub payment: Payment,
    pub replayed: bool,
}

pub struct ReconciliationEngine {
    db: DbPool,
    notifier: Arc<dyn Notifier>,
}

impl ReconciliationEngine {
    pub fn new(db: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Register a cash or in-person card payment. These settle at the desk,
    /// so the payment is created directly in `completed` and side effects run
    /// before the transaction commits.
    pub fn register_immediate_payment(&self, input: RegisterImmediatePayment) -> Result<Payment> {
        if !input.rail.is_immediate() {
            return Err(AppError::Validation(format!(
                "rail {} cannot be registered as an immediate payment",
                input.rail
            )));
        }
        validate_amount(input.amount_cents)?;

        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        validate_refs(&tx, &input.refs)?;

        let payment = queries::insert_payment(
            &tx,
            &CreatePayment {
                gateway_transaction_id: None,
                amount_cents: input.amount_cents,
                rail: input.rail,
                purpose: input.purpose,
                status: PaymentStatus::Completed,
                refs: input.refs,
                created_by: input.actor_id,
                notes: input.notes,
            },
        )?;
        effects::run_completion_effects(&tx, &payment)?;
        tx.commit()?;

        self.notifier.payment_completed(&payment);
        Ok(payment)
    }

    /// Register a bank-transfer payment. Stays `pending` until a validator
    /// resolves it; no side effects yet.
    pub fn register_transfer_payment(&self, input: RegisterTransferPayment) -> Result<Payment> {
        validate_amount(input.amount_cents)?;

        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        validate_refs(&tx, &input.refs)?;

        let payment = queries::insert_payment(
            &tx,
            &CreatePayment {
                gateway_transaction_id: None,
                amount_cents: input.amount_cents,
                rail: PaymentRail::Transfer,
                purpose: input.purpose,
                status: PaymentStatus::Pending,
                refs: input.refs,
                created_by: input.actor_id,
                notes: input.notes,
            },
        )?;
        tx.commit()?;
        Ok(payment)
    }

    /// Attach a proof-of-transfer pointer. Leaves the payment `pending`
    /// (re-affirming it if the status had drifted), ready for validation.
    pub fn attach_transfer_proof(
        &self,
        payment_id: &str,
        proof: &str,
        actor_id: Option<&str>,
    ) -> Result<Payment> {
        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let payment = queries::get_payment_by_id(&tx, payment_id)?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.rail != PaymentRail::Transfer {
            return Err(AppError::InvalidState(format!(
                "payment {} uses rail {}, not transfer",
                payment_id, payment.rail
            )));
        }
        if payment.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "payment {} is already {}",
                payment_id, payment.status
            )));
        }

        queries::set_transfer_proof(&tx, payment_id, proof)?;
        let updated = queries::get_payment_by_id(&tx, payment_id)?
            .ok_or_else(|| AppError::Internal("payment vanished during proof attach".into()))?;
        tx.commit()?;

        tracing::info!(payment_id = %payment_id, actor = ?actor_id, "transfer proof attached");
        Ok(updated)
    }

    /// Approve or reject a pending transfer. The `status = 'pending'` guard
    /// on the update makes two concurrent resolutions race safely: the loser
    /// gets `InvalidState`, regardless of either call's verdict.
    pub fn resolve_transfer(
        &self,
        payment_id: &str,
        approved: bool,
        validator_id: &str,
        notes: Option<&str>,
    ) -> Result<Payment> {
        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let payment = queries::get_payment_by_id(&tx, payment_id)?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.rail != PaymentRail::Transfer {
            return Err(AppError::InvalidState(format!(
                "payment {} uses rail {}, not transfer",
                payment_id, payment.rail
            )));
        }
        if payment.transfer_proof.is_none() {
            return Err(AppError::InvalidState(format!(
                "payment {} has no transfer proof attached",
                payment_id
            )));
        }

        let new_status = if approved {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };
        if !queries::cas_resolve_transfer(&tx, payment_id, new_status, validator_id, notes)? {
            return Err(AppError::InvalidState(format!(
                "payment {} is already resolved ({})",
                payment_id, payment.status
            )));
        }

        let resolved = queries::get_payment_by_id(&tx, payment_id)?
            .ok_or_else(|| AppError::Internal("payment vanished during resolution".into()))?;

        if approved {
            effects::run_completion_effects(&tx, &resolved)?;
        }
        tx.commit()?;

        if approved {
            self.notifier.payment_completed(&resolved);
        } else {
            self.notifier.transfer_rejected(&resolved);
        }
        Ok(resolved)
    }

    /// Idempotent confirmation keyed on the gateway transaction id. Used by
    /// both the synchronous client-confirmation call and asynchronous webhook
    /// delivery; both paths race to the same outcome. The loser observes the
    /// existing row (pre-check inside the write transaction, with the unique
    /// index as backstop) and reports `replayed = true`.
    pub fn confirm_gateway_payment(&self, input: ConfirmGatewayPayment) -> Result<ConfirmOutcome> {
        validate_amount(input.amount_cents)?;

        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) =
            queries::get_payment_by_gateway_txn(&tx, &input.gateway_transaction_id)?
        {
            tracing::info!(
                gateway_txn = %input.gateway_transaction_id,
                payment_id = %existing.id,
                "gateway transaction already booked, returning existing payment"
            );
            return Ok(ConfirmOutcome {
                payment: existing,
                replayed: true,
            });
        }

        // The gateway has already captured funds; the payment is born completed.
        let insert = queries::insert_payment(
            &tx,
            &CreatePayment {
                gateway_transaction_id: Some(input.gateway_transaction_id.clone()),
                amount_cents: input.amount_cents,
                rail: PaymentRail::CardGateway,
                purpose: input.purpose,
                status: PaymentStatus::Completed,
                refs: input.refs,
                created_by: Some("gateway".to_string()),
                notes: None,
            },
        );

        let payment = match insert {
            Ok(payment) => payment,
            Err(AppError::Database(ref e)) if queries::is_unique_violation(e) => {
                // Lost the cross-process race; the winner's row is the record.
                let existing =
                    queries::get_payment_by_gateway_txn(&tx, &input.gateway_transaction_id)?
                        .ok_or_else(|| {
                            AppError::Internal(
                                "payment vanished after unique-constraint hit".into(),
                            )
                        })?;
                return Ok(ConfirmOutcome {
                    payment: existing,
                    replayed: true,
                });
            }
            Err(e) => return Err(e),
        };

        effects::run_completion_effects(&tx, &payment)?;
        tx.commit()?;

        self.notifier.payment_completed(&payment);
        Ok(ConfirmOutcome {
            payment,
            replayed: false,
        })
    }

    /// Gateway reported the intent failed. The local record may not exist yet
    /// (payments are only created at confirmation), so absence is a logged
    /// no-op, not an error.
    pub fn mark_gateway_payment_failed(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>> {
        self.mark_gateway_payment(gateway_transaction_id, PaymentStatus::Failed)
    }

    /// Gateway reported the intent was cancelled before capture.
    pub fn mark_gateway_payment_cancelled(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>> {
        self.mark_gateway_payment(gateway_transaction_id, PaymentStatus::Cancelled)
    }

    fn mark_gateway_payment(
        &self,
        gateway_transaction_id: &str,
        new_status: PaymentStatus,
    ) -> Result<Option<Payment>> {
        let conn = self.db.get()?;

        let Some(payment) = queries::get_payment_by_gateway_txn(&conn, gateway_transaction_id)?
        else {
            tracing::info!(
                gateway_txn = %gateway_transaction_id,
                target = %new_status,
                "no local payment for gateway transaction; nothing to update"
            );
            return Ok(None);
        };

        if !payment.status.can_transition_to(new_status) {
            // Out-of-order delivery: a failed/canceled event arriving after
            // confirmation must not undo a completed payment.
            tracing::warn!(
                payment_id = %payment.id,
                current = %payment.status,
                target = %new_status,
                "ignoring out-of-order gateway status event"
            );
            return Ok(Some(payment));
        }

        queries::cas_update_gateway_payment_status(&conn, gateway_transaction_id, new_status)?;
        Ok(queries::get_payment_by_gateway_txn(&conn, gateway_transaction_id)?)
    }

    /// Staff queue view over pending transfer payments.
    pub fn transfer_queue(&self) -> Result<TransferQueue> {
        let conn = self.db.get()?;
        transfers::validation_queue(&conn)
    }

    pub fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        let conn = self.db.get()?;
        queries::get_payment_by_id(&conn, payment_id)
    }

    pub fn list_payments(&self, limit: i64) -> Result<Vec<Payment>> {
        let conn = self.db.get()?;
        queries::list_payments(&conn, limit)
    }
}

fn validate_amount(amount_cents: i64) -> Result<()> {
    if amount_cents <= 0 {
        return Err(AppError::Validation(
            "amount must be a positive number of cents".into(),
        ));
    }
    Ok(())
}

/// Referenced domain objects must exist before a payment points at them.
fn validate_refs(conn: &rusqlite::Connection, refs: &PaymentRefs) -> Result<()> {
    if let Some(user_id) = refs.user_id.as_deref() {
        if queries::get_user_by_id(conn, user_id)?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
    }
    if let Some(membership_id) = refs.membership_id.as_deref() {
        if queries::get_membership_by_id(conn, membership_id)?.is_none() {
            return Err(AppError::NotFound(format!(
                "Membership {} not found",
                membership_id
            )));
        }
    }
    if refs.reference_type.as_deref() == Some(REF_TYPE_STORE_ORDER) {
        if let Some(order_id) = refs.reference_id.as_deref() {
            if queries::get_order_by_id(conn, order_id)?.is_none() {
                return Err(AppError::NotFound(format!("Order {} not found", order_id)));
            }
        }
    }
    Ok(())
}
