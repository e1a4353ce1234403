//! Bridge between gateway webhook deliveries and the reconciliation engine.
//!
//! Deliveries are at-least-once and possibly out of order; every path through
//! here must tolerate seeing the same event twice. The payment-level
//! idempotency key (gateway transaction id) is the authoritative guard, with
//! the webhook-event ledger as defense in depth.

use serde::Deserialize;

use crate::engine::{ConfirmGatewayPayment, ReconciliationEngine};
use crate::error::Result;
use crate::models::{Payment, PaymentPurpose};

use super::client::GatewayIntent;

/// Event types the bridge acts on; everything else is acknowledged and
/// ignored.
pub const EVENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_FAILED: &str = "payment_intent.payment_failed";
pub const EVENT_CANCELED: &str = "payment_intent.canceled";

/// Envelope of a gateway webhook delivery.
#[derive(Debug, Deserialize)]
pub struct GatewayWebhookEvent {
    /// Unique event id, used for the replay ledger.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Deserialize)]
pub struct GatewayEventData {
    pub object: GatewayIntent,
}

/// What the bridge did with a callback.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// A new payment was booked (or an existing one returned on replay).
    Confirmed { payment: Payment, replayed: bool },
    /// The matching pending payment was failed, if one existed.
    MarkedFailed(Option<Payment>),
    /// The matching pending payment was cancelled, if one existed.
    MarkedCancelled(Option<Payment>),
    /// Event type the bridge does not act on.
    Ignored,
}

/// Dispatch a verified webhook event into the engine. The caller has already
/// checked the signature; from here the payload's amount and metadata are
/// trusted.
pub fn handle_callback(
    engine: &ReconciliationEngine,
    event: GatewayWebhookEvent,
) -> Result<CallbackOutcome> {
    let intent = event.data.object;

    match event.event_type.as_str() {
        EVENT_SUCCEEDED => {
            let purpose = intent.metadata.purpose.unwrap_or_else(|| {
                tracing::warn!(
                    gateway_txn = %intent.id,
                    "intent metadata carries no purpose; booking as 'other'"
                );
                PaymentPurpose::Other
            });
            let outcome = engine.confirm_gateway_payment(ConfirmGatewayPayment {
                gateway_transaction_id: intent.id,
                amount_cents: intent.amount,
                purpose,
                refs: intent.metadata.into_refs(),
            })?;
            Ok(CallbackOutcome::Confirmed {
                payment: outcome.payment,
                replayed: outcome.replayed,
            })
        }
        EVENT_FAILED => Ok(CallbackOutcome::MarkedFailed(
            engine.mark_gateway_payment_failed(&intent.id)?,
        )),
        EVENT_CANCELED => Ok(CallbackOutcome::MarkedCancelled(
            engine.mark_gateway_payment_cancelled(&intent.id)?,
        )),
        other => {
            tracing::debug!(event_type = %other, "ignoring gateway event");
            Ok(CallbackOutcome::Ignored)
        }
    }
}
