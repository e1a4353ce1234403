//! Gateway tests: webhook signature verification and callback dispatch.

mod common;

use common::*;
use gymledger::engine::REF_TYPE_PAYMENT;
use gymledger::gateway::{
    handle_callback, CallbackOutcome, GatewayClient, GatewayConfig, GatewayWebhookEvent,
    EVENT_FAILED, EVENT_SUCCEEDED,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

const WEBHOOK_SECRET: &str = "whsec_test_secret";

fn test_client() -> GatewayClient {
    GatewayClient::new(&GatewayConfig {
        api_base: "https://gateway.invalid".to_string(),
        secret_key: "sk_test_key".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    })
}

fn sign(payload: &[u8], timestamp: i64) -> String {
    let signed = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key");
    mac.update(signed.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn succeeded_event(txn_id: &str, amount: i64, metadata: serde_json::Value) -> GatewayWebhookEvent {
    serde_json::from_value(serde_json::json!({
        "id": format!("evt_{}", txn_id),
        "type": EVENT_SUCCEEDED,
        "data": {
            "object": {
                "id": txn_id,
                "status": "succeeded",
                "amount": amount,
                "currency": "usd",
                "metadata": metadata,
            }
        }
    }))
    .expect("valid event payload")
}

#[test]
fn valid_signature_is_accepted() {
    let client = test_client();
    let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
    let sig = sign(payload, now());
    assert!(client.verify_webhook_signature(payload, &sig).unwrap());
}

#[test]
fn wrong_secret_and_tampered_payload_are_rejected() {
    let client = test_client();
    let payload = br#"{"id":"evt_1","amount":5000}"#;
    let sig = sign(payload, now());

    // Same signature over a modified payload fails.
    let tampered = br#"{"id":"evt_1","amount":9000}"#;
    assert!(!client.verify_webhook_signature(tampered, &sig).unwrap());

    // Garbage v1 fails.
    let bad_sig = format!("t={},v1={}", now(), "ab".repeat(32));
    assert!(!client.verify_webhook_signature(payload, &bad_sig).unwrap());
}

#[test]
fn stale_and_future_timestamps_are_rejected() {
    let client = test_client();
    let payload = br#"{"id":"evt_1"}"#;

    let stale = sign(payload, now() - 600);
    assert!(!client.verify_webhook_signature(payload, &stale).unwrap());

    let future = sign(payload, now() + 600);
    assert!(!client.verify_webhook_signature(payload, &future).unwrap());
}

#[test]
fn malformed_signature_header_is_an_error() {
    let client = test_client();
    let payload = b"{}";
    assert!(client.verify_webhook_signature(payload, "not-a-signature").is_err());
    assert!(client.verify_webhook_signature(payload, "t=abc,v1=def").is_err());
}

#[test]
fn succeeded_event_books_payment_and_movement() {
    let ctx = setup();

    let outcome = handle_callback(
        &ctx.engine,
        succeeded_event("pi_100", 4500, serde_json::json!({"purpose": "daily_entry"})),
    )
    .unwrap();

    let CallbackOutcome::Confirmed { payment, replayed } = outcome else {
        panic!("expected confirmation");
    };
    assert!(!replayed);
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.rail, PaymentRail::CardGateway);
    assert_eq!(payment.amount_cents, 4500);
    assert_eq!(payment.gateway_transaction_id.as_deref(), Some("pi_100"));
    assert_eq!(payment.created_by.as_deref(), Some("gateway"));

    let conn = ctx.db.get().unwrap();
    let movement = queries::get_movement_by_reference(&conn, &payment.id, REF_TYPE_PAYMENT)
        .unwrap()
        .unwrap();
    assert_eq!(movement.category, MovementCategory::DailyIncome);
    assert_eq!(queries::count_movements(&conn).unwrap(), 1);
}

#[test]
fn duplicate_confirmation_replays_the_same_payment() {
    let ctx = setup();

    let first = handle_callback(
        &ctx.engine,
        succeeded_event("pi_200", 9900, serde_json::json!({"purpose": "other"})),
    )
    .unwrap();
    let CallbackOutcome::Confirmed { payment: original, replayed: false } = first else {
        panic!("expected fresh confirmation");
    };

    // Redelivery of the same intent: same payment row, no second movement.
    let second = handle_callback(
        &ctx.engine,
        succeeded_event("pi_200", 9900, serde_json::json!({"purpose": "other"})),
    )
    .unwrap();
    let CallbackOutcome::Confirmed { payment: replay, replayed: true } = second else {
        panic!("expected replay");
    };
    assert_eq!(replay.id, original.id);

    let conn = ctx.db.get().unwrap();
    assert_eq!(queries::count_movements(&conn).unwrap(), 1);
    assert_eq!(queries::list_payments(&conn, 10).unwrap().len(), 1);
}

#[test]
fn succeeded_metadata_activates_referenced_membership() {
    let ctx = setup();
    let conn = ctx.db.get().unwrap();
    let user = create_test_user(&conn, "gateway@example.com");
    let membership = create_test_membership(&conn, &user.id, now() - 3 * DAY_SECS);
    drop(conn);

    let event = succeeded_event(
        "pi_300",
        30_000,
        serde_json::json!({
            "purpose": "membership",
            "user_id": user.id,
            "membership_id": membership.id,
        }),
    );
    let outcome = handle_callback(&ctx.engine, event).unwrap();
    assert!(matches!(outcome, CallbackOutcome::Confirmed { replayed: false, .. }));

    let conn = ctx.db.get().unwrap();
    let updated = queries::get_membership_by_id(&conn, &membership.id)
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, MembershipStatus::Active);
    assert!(updated.end_date > now() + 29 * DAY_SECS);
}

#[test]
fn failed_event_without_local_payment_is_a_no_op() {
    let ctx = setup();

    let event: GatewayWebhookEvent = serde_json::from_value(serde_json::json!({
        "id": "evt_fail_1",
        "type": EVENT_FAILED,
        "data": {
            "object": {
                "id": "pi_unknown",
                "status": "requires_payment_method",
                "amount": 1000,
                "currency": "usd",
            }
        }
    }))
    .unwrap();

    let outcome = handle_callback(&ctx.engine, event).unwrap();
    assert!(matches!(outcome, CallbackOutcome::MarkedFailed(None)));
}

#[test]
fn late_failure_event_does_not_undo_a_completed_payment() {
    let ctx = setup();

    handle_callback(
        &ctx.engine,
        succeeded_event("pi_400", 2000, serde_json::json!({"purpose": "other"})),
    )
    .unwrap();

    // Out-of-order failure delivery for the already-confirmed intent.
    let event: GatewayWebhookEvent = serde_json::from_value(serde_json::json!({
        "id": "evt_fail_2",
        "type": EVENT_FAILED,
        "data": {
            "object": {
                "id": "pi_400",
                "status": "requires_payment_method",
                "amount": 2000,
                "currency": "usd",
            }
        }
    }))
    .unwrap();
    let outcome = handle_callback(&ctx.engine, event).unwrap();

    let CallbackOutcome::MarkedFailed(Some(payment)) = outcome else {
        panic!("expected the existing payment back");
    };
    assert_eq!(payment.status, PaymentStatus::Completed);

    let conn = ctx.db.get().unwrap();
    assert_eq!(queries::count_movements(&conn).unwrap(), 1);
}

#[test]
fn unknown_event_types_are_ignored() {
    let ctx = setup();

    let event: GatewayWebhookEvent = serde_json::from_value(serde_json::json!({
        "id": "evt_misc",
        "type": "charge.updated",
        "data": {
            "object": {
                "id": "pi_500",
                "status": "succeeded",
                "amount": 100,
                "currency": "usd",
            }
        }
    }))
    .unwrap();

    let outcome = handle_callback(&ctx.engine, event).unwrap();
    assert!(matches!(outcome, CallbackOutcome::Ignored));

    let conn = ctx.db.get().unwrap();
    assert!(queries::list_payments(&conn, 10).unwrap().is_empty());
}

#[test]
fn webhook_event_ledger_tracks_replays() {
    let ctx = setup();
    let conn = ctx.db.get().unwrap();

    assert!(!queries::webhook_event_seen(&conn, "gateway", "evt_1").unwrap());
    assert!(queries::record_webhook_event(&conn, "gateway", "evt_1").unwrap());
    // Second insert is a replay, not an error.
    assert!(!queries::record_webhook_event(&conn, "gateway", "evt_1").unwrap());
    assert!(queries::webhook_event_seen(&conn, "gateway", "evt_1").unwrap());
    assert!(!queries::webhook_event_seen(&conn, "gateway", "evt_2").unwrap());
}
