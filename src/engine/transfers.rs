//! Transfer validation workflow: a read-only policy layer over the engine's
//! transfer operations that drives the staff approval queue. Holds no state
//! of its own.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::Result;
use crate::models::Payment;

/// A pending transfer with its age, for oldest-first prioritization.
#[derive(Debug, Clone, Serialize)]
pub struct TransferQueueEntry {
    #[serde(flatten)]
    pub payment: Payment,
    /// Whole hours since the payment was registered.
    pub age_hours: i64,
}

/// Pending transfers split by whether they can be validated yet.
#[derive(Debug, Clone, Serialize)]
pub struct TransferQueue {
    /// Proof attached; a validator can act on these now.
    pub ready: Vec<TransferQueueEntry>,
    /// Still waiting for the client to upload proof.
    pub awaiting_proof: Vec<TransferQueueEntry>,
}

/// Build the validation queue: rail=transfer, status=pending, oldest first.
pub fn validation_queue(conn: &Connection) -> Result<TransferQueue> {
    let now = Utc::now().timestamp();
    let pending = queries::list_pending_transfers(conn)?;

    let mut ready = Vec::new();
    let mut awaiting_proof = Vec::new();
    for payment in pending {
        let entry = TransferQueueEntry {
            age_hours: (now - payment.created_at).max(0) / 3600,
            payment,
        };
        if entry.payment.transfer_proof.is_some() {
            ready.push(entry);
        } else {
            awaiting_proof.push(entry);
        }
    }

    Ok(TransferQueue {
        ready,
        awaiting_proof,
    })
}
