//! Best-effort notification collaborator.
//!
//! Notifications are fire-and-forget: a payment that completed successfully
//! stays completed even if the receipt message fails. Implementations log
//! their own failures and never return errors to the engine.

use crate::models::Payment;

/// Injected into the reconciliation engine so tests can substitute fakes.
pub trait Notifier: Send + Sync {
    /// A payment reached `completed`.
    fn payment_completed(&self, payment: &Payment);

    /// A transfer was rejected by a validator.
    fn transfer_rejected(&self, payment: &Payment);
}

/// Default notifier: structured log lines only. A real deployment swaps in
/// an email/push implementation behind the same trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn payment_completed(&self, payment: &Payment) {
        tracing::info!(
            payment_id = %payment.id,
            rail = %payment.rail,
            purpose = %payment.purpose,
            amount_cents = payment.amount_cents,
            "payment completed"
        );
    }

    fn transfer_rejected(&self, payment: &Payment) {
        tracing::info!(
            payment_id = %payment.id,
            validated_by = ?payment.validated_by,
            "transfer payment rejected"
        );
    }
}
