//! HTTP surface for the four payment rails' staff-facing entry points.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::db::AppState;
use crate::engine::{RegisterImmediatePayment, RegisterTransferPayment, TransferQueue};
use crate::error::{msg, OptionExt, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{Payment, PaymentPurpose, PaymentRail, PaymentRefs};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(register_payment).get(list_payments))
        .route("/payments/transfer", post(register_transfer))
        .route("/payments/transfers/queue", get(transfer_queue))
        .route("/payments/{id}", get(get_payment))
        .route("/payments/{id}/transfer-proof", post(attach_transfer_proof))
        .route("/payments/{id}/validate-transfer", post(validate_transfer))
}

#[derive(Debug, Deserialize)]
struct RegisterPaymentRequest {
    rail: PaymentRail,
    amount_cents: i64,
    purpose: PaymentPurpose,
    #[serde(default)]
    refs: PaymentRefs,
    #[serde(default)]
    actor_id: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Staff registers a cash or in-person card payment. Settles immediately.
async fn register_payment(
    State(state): State<AppState>,
    Json(request): Json<RegisterPaymentRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let payment = state.engine.register_immediate_payment(RegisterImmediatePayment {
        rail: request.rail,
        amount_cents: request.amount_cents,
        purpose: request.purpose,
        refs: request.refs,
        actor_id: request.actor_id,
        notes: request.notes,
    })?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Debug, Deserialize)]
struct RegisterTransferRequest {
    amount_cents: i64,
    purpose: PaymentPurpose,
    #[serde(default)]
    refs: PaymentRefs,
    #[serde(default)]
    actor_id: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// A client announces a bank transfer; the payment waits for proof and
/// validation.
async fn register_transfer(
    State(state): State<AppState>,
    Json(request): Json<RegisterTransferRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let payment = state.engine.register_transfer_payment(RegisterTransferPayment {
        amount_cents: request.amount_cents,
        purpose: request.purpose,
        refs: request.refs,
        actor_id: request.actor_id,
        notes: request.notes,
    })?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Debug, Deserialize)]
struct AttachProofRequest {
    proof: String,
    #[serde(default)]
    actor_id: Option<String>,
}

async fn attach_transfer_proof(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AttachProofRequest>,
) -> Result<Json<Payment>> {
    let payment =
        state
            .engine
            .attach_transfer_proof(&id, &request.proof, request.actor_id.as_deref())?;
    Ok(Json(payment))
}

#[derive(Debug, Deserialize)]
struct ValidateTransferRequest {
    approved: bool,
    validator_id: String,
    #[serde(default)]
    notes: Option<String>,
}

async fn validate_transfer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ValidateTransferRequest>,
) -> Result<Json<Payment>> {
    let payment = state.engine.resolve_transfer(
        &id,
        request.approved,
        &request.validator_id,
        request.notes.as_deref(),
    )?;
    Ok(Json(payment))
}

async fn transfer_queue(State(state): State<AppState>) -> Result<Json<TransferQueue>> {
    Ok(Json(state.engine.transfer_queue()?))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Payment>> {
    let payment = state.engine.get_payment(&id)?.or_not_found(msg::PAYMENT_NOT_FOUND)?;
    Ok(Json(payment))
}

#[derive(Debug, Deserialize)]
struct ListPaymentsQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Vec<Payment>>> {
    Ok(Json(state.engine.list_payments(query.limit.clamp(1, 500))?))
}
