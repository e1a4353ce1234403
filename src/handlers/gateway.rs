//! HTTP surface for the gateway intent bridge: intent creation, synchronous
//! client confirmation, and asynchronous webhook delivery.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::engine::ConfirmGatewayPayment;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::gateway::{self, CallbackOutcome, CreatedIntent, GatewayWebhookEvent, IntentMetadata};
use crate::models::Payment;

const WEBHOOK_PROVIDER: &str = "gateway";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gateway/intents", post(create_intent))
        .route("/gateway/confirm", post(confirm_payment))
        .route("/gateway/webhook", post(handle_webhook))
}

#[derive(Debug, Deserialize)]
struct CreateIntentRequest {
    amount_cents: i64,
    #[serde(flatten)]
    metadata: IntentMetadata,
}

/// Create a payment intent with the gateway. Deliberately creates no local
/// payment row: abandoned checkouts never reach the ledger, and a caller
/// timeout here leaves nothing half-created.
async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<CreatedIntent>)> {
    if request.amount_cents <= 0 {
        return Err(AppError::Validation(
            "amount must be a positive number of cents".into(),
        ));
    }
    let intent = state
        .gateway
        .create_intent(request.amount_cents, &state.currency, &request.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    transaction_id: String,
}

/// Synchronous confirmation: the client claims its intent succeeded. The
/// intent is re-read from the gateway so the caller's claims are never
/// trusted. Replays surface as 409 with the already-booked payment.
async fn confirm_payment(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let intent = state.gateway.retrieve_intent(&request.transaction_id).await?;

    if intent.status != "succeeded" {
        return Err(AppError::InvalidState(format!(
            "gateway transaction {} is {}, not succeeded",
            intent.id, intent.status
        )));
    }

    let purpose = intent
        .metadata
        .purpose
        .unwrap_or(crate::models::PaymentPurpose::Other);
    let outcome = state.engine.confirm_gateway_payment(ConfirmGatewayPayment {
        gateway_transaction_id: intent.id,
        amount_cents: intent.amount,
        purpose,
        refs: intent.metadata.into_refs(),
    })?;

    let status = if outcome.replayed {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.payment)))
}

/// Asynchronous webhook delivery. Always answers 2xx once the signature
/// checks out, including on replays; anything else makes the gateway retry
/// forever. An invalid signature is a hard failure.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(signature) = headers
        .get("gateway-signature")
        .and_then(|value| value.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Missing or invalid signature header");
    };

    match state.gateway.verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::BAD_REQUEST, "Invalid signature"),
        Err(e) => {
            tracing::error!("signature verification error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Signature verification failed");
        }
    }

    let event: GatewayWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!("failed to parse gateway webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    // Event-level replay check; the payment-level idempotency key inside the
    // engine is the authoritative guard. The event is only recorded as seen
    // after processing succeeds, so a failed delivery stays retryable.
    match event_seen(&state, &event.id) {
        Ok(true) => {
            tracing::info!(event_id = %event.id, "webhook event already processed");
            return (StatusCode::OK, "Already processed");
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!("failed to check webhook event: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    let event_id = event.id.clone();
    match gateway::handle_callback(&state.engine, event) {
        Ok(outcome) => {
            if let Err(e) = record_event(&state, &event_id) {
                tracing::warn!("failed to record webhook event {}: {}", event_id, e);
            }
            match outcome {
                CallbackOutcome::Confirmed { payment, replayed } => {
                    tracing::info!(payment_id = %payment.id, replayed, "gateway payment confirmed");
                    (StatusCode::OK, "OK")
                }
                CallbackOutcome::MarkedFailed(_) | CallbackOutcome::MarkedCancelled(_) => {
                    (StatusCode::OK, "OK")
                }
                CallbackOutcome::Ignored => (StatusCode::OK, "Ignored"),
            }
        }
        Err(e) => {
            tracing::error!("webhook processing failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed")
        }
    }
}

fn event_seen(state: &AppState, event_id: &str) -> Result<bool> {
    let conn = state.db.get()?;
    queries::webhook_event_seen(&conn, WEBHOOK_PROVIDER, event_id)
}

fn record_event(state: &AppState, event_id: &str) -> Result<bool> {
    let conn = state.db.get()?;
    queries::record_webhook_event(&conn, WEBHOOK_PROVIDER, event_id)
}
