//! Bank-transfer workflow tests: registration, proof upload, validation.

mod common;

use common::*;
use gymledger::engine::{RegisterTransferPayment, REF_TYPE_PAYMENT};
use gymledger::error::AppError;

fn transfer(amount_cents: i64, refs: PaymentRefs) -> RegisterTransferPayment {
    RegisterTransferPayment {
        amount_cents,
        purpose: PaymentPurpose::Membership,
        refs,
        actor_id: None,
        notes: None,
    }
}

#[test]
fn transfer_round_trip_activates_membership_on_approval() {
    let ctx = setup();
    let conn = ctx.db.get().unwrap();
    let user = create_test_user(&conn, "transfer@example.com");
    // Lapsed a while ago; approval should restart the clock from today.
    let membership = create_test_membership(&conn, &user.id, now() - 5 * DAY_SECS);
    drop(conn);

    let payment = ctx
        .engine
        .register_transfer_payment(transfer(30_000, membership_refs(&membership)))
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.rail, PaymentRail::Transfer);
    assert!(payment.transfer_proof.is_none());

    let with_proof = ctx
        .engine
        .attach_transfer_proof(&payment.id, "receipts/2026/xfer-991.png", Some(&user.id))
        .unwrap();
    assert_eq!(with_proof.status, PaymentStatus::Pending);
    assert_eq!(
        with_proof.transfer_proof.as_deref(),
        Some("receipts/2026/xfer-991.png")
    );

    let resolved = ctx
        .engine
        .resolve_transfer(&payment.id, true, "staff-7", Some("matched bank statement"))
        .unwrap();
    assert_eq!(resolved.status, PaymentStatus::Completed);
    assert_eq!(resolved.validated_by.as_deref(), Some("staff-7"));
    assert!(resolved.validated_at.is_some());

    let conn = ctx.db.get().unwrap();
    let updated = queries::get_membership_by_id(&conn, &membership.id)
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, MembershipStatus::Active);
    let expected = now() + 30 * DAY_SECS;
    assert!((updated.end_date - expected).abs() < 60);

    let movement = queries::get_movement_by_reference(&conn, &payment.id, REF_TYPE_PAYMENT)
        .unwrap()
        .unwrap();
    assert_eq!(movement.category, MovementCategory::MembershipIncome);
    assert_eq!(queries::count_movements(&conn).unwrap(), 1);
}

#[test]
fn rejected_transfer_fails_without_side_effects() {
    let ctx = setup();
    let conn = ctx.db.get().unwrap();
    let user = create_test_user(&conn, "reject@example.com");
    let membership = create_test_membership(&conn, &user.id, now() - DAY_SECS);
    drop(conn);

    let payment = ctx
        .engine
        .register_transfer_payment(transfer(30_000, membership_refs(&membership)))
        .unwrap();
    ctx.engine
        .attach_transfer_proof(&payment.id, "receipts/blurry.jpg", None)
        .unwrap();

    let resolved = ctx
        .engine
        .resolve_transfer(&payment.id, false, "staff-7", Some("amount does not match"))
        .unwrap();
    assert_eq!(resolved.status, PaymentStatus::Failed);

    let conn = ctx.db.get().unwrap();
    // Membership untouched, no ledger entry.
    let membership = queries::get_membership_by_id(&conn, &membership.id)
        .unwrap()
        .unwrap();
    assert_ne!(membership.status, MembershipStatus::Active);
    assert_eq!(queries::count_movements(&conn).unwrap(), 0);
}

#[test]
fn resolve_requires_attached_proof() {
    let ctx = setup();

    let payment = ctx
        .engine
        .register_transfer_payment(transfer(1000, PaymentRefs::default()))
        .unwrap();

    let result = ctx.engine.resolve_transfer(&payment.id, true, "staff-1", None);
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

#[test]
fn second_resolution_loses_regardless_of_verdict() {
    let ctx = setup();

    let payment = ctx
        .engine
        .register_transfer_payment(transfer(1000, PaymentRefs::default()))
        .unwrap();
    ctx.engine
        .attach_transfer_proof(&payment.id, "receipts/ok.png", None)
        .unwrap();

    ctx.engine
        .resolve_transfer(&payment.id, true, "staff-1", None)
        .unwrap();

    // Approve-again and reject-after-approve both hit the resolved guard.
    for verdict in [true, false] {
        let result = ctx.engine.resolve_transfer(&payment.id, verdict, "staff-2", None);
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    // The first resolution's ledger entry is the only one.
    let conn = ctx.db.get().unwrap();
    assert_eq!(queries::count_movements(&conn).unwrap(), 1);
}

#[test]
fn proof_cannot_be_attached_to_resolved_or_foreign_payments() {
    let ctx = setup();

    let cash = ctx
        .engine
        .register_immediate_payment(gymledger::engine::RegisterImmediatePayment {
            rail: PaymentRail::Cash,
            amount_cents: 500,
            purpose: PaymentPurpose::Other,
            refs: PaymentRefs::default(),
            actor_id: None,
            notes: None,
        })
        .unwrap();
    let result = ctx.engine.attach_transfer_proof(&cash.id, "receipts/x.png", None);
    assert!(matches!(result, Err(AppError::InvalidState(_))));

    let transfer_payment = ctx
        .engine
        .register_transfer_payment(transfer(1000, PaymentRefs::default()))
        .unwrap();
    ctx.engine
        .attach_transfer_proof(&transfer_payment.id, "receipts/a.png", None)
        .unwrap();
    ctx.engine
        .resolve_transfer(&transfer_payment.id, false, "staff-1", None)
        .unwrap();

    let result = ctx
        .engine
        .attach_transfer_proof(&transfer_payment.id, "receipts/b.png", None);
    assert!(matches!(result, Err(AppError::InvalidState(_))));

    let missing = ctx.engine.attach_transfer_proof("nope", "receipts/c.png", None);
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[test]
fn queue_partitions_by_proof_and_orders_oldest_first() {
    let ctx = setup();

    let first = ctx
        .engine
        .register_transfer_payment(transfer(1000, PaymentRefs::default()))
        .unwrap();
    let second = ctx
        .engine
        .register_transfer_payment(transfer(2000, PaymentRefs::default()))
        .unwrap();
    let third = ctx
        .engine
        .register_transfer_payment(transfer(3000, PaymentRefs::default()))
        .unwrap();

    ctx.engine
        .attach_transfer_proof(&first.id, "receipts/1.png", None)
        .unwrap();
    ctx.engine
        .attach_transfer_proof(&third.id, "receipts/3.png", None)
        .unwrap();

    // Backdate the first payment so ordering and age are observable.
    {
        let conn = ctx.db.get().unwrap();
        conn.execute(
            "UPDATE payments SET created_at = created_at - 7200 WHERE id = ?1",
            [&first.id],
        )
        .unwrap();
    }

    let queue = ctx.engine.transfer_queue().unwrap();

    let ready_ids: Vec<&str> = queue.ready.iter().map(|e| e.payment.id.as_str()).collect();
    assert_eq!(ready_ids, vec![first.id.as_str(), third.id.as_str()]);
    assert_eq!(queue.ready[0].age_hours, 2);

    let waiting_ids: Vec<&str> = queue
        .awaiting_proof
        .iter()
        .map(|e| e.payment.id.as_str())
        .collect();
    assert_eq!(waiting_ids, vec![second.id.as_str()]);

    // Resolved payments drop out of the queue.
    ctx.engine
        .resolve_transfer(&first.id, true, "staff-1", None)
        .unwrap();
    let queue = ctx.engine.transfer_queue().unwrap();
    assert_eq!(queue.ready.len(), 1);
    assert_eq!(queue.ready[0].payment.id, third.id);
}
