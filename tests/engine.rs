//! Reconciliation engine tests: immediate rails, side effects, state machine.

mod common;

use common::*;
use gymledger::engine::{effects, RegisterImmediatePayment, REF_TYPE_PAYMENT};
use gymledger::error::AppError;

fn cash_payment(amount_cents: i64, purpose: PaymentPurpose) -> RegisterImmediatePayment {
    RegisterImmediatePayment {
        rail: PaymentRail::Cash,
        amount_cents,
        purpose,
        refs: PaymentRefs::default(),
        actor_id: Some("staff-1".to_string()),
        notes: None,
    }
}

#[test]
fn cash_daily_entry_completes_immediately_with_one_movement() {
    let ctx = setup();

    let payment = ctx
        .engine
        .register_immediate_payment(cash_payment(5000, PaymentPurpose::DailyEntry))
        .expect("cash payment should succeed");

    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.rail, PaymentRail::Cash);
    assert_eq!(payment.created_by.as_deref(), Some("staff-1"));

    let conn = ctx.db.get().unwrap();
    let movement = queries::get_movement_by_reference(&conn, &payment.id, REF_TYPE_PAYMENT)
        .unwrap()
        .expect("movement should exist");
    assert_eq!(movement.category, MovementCategory::DailyIncome);
    assert_eq!(movement.movement_type, MovementType::Income);
    assert_eq!(movement.amount_cents, 5000);
    assert_eq!(queries::count_movements(&conn).unwrap(), 1);
}

#[test]
fn immediate_payment_rejects_non_immediate_rails() {
    let ctx = setup();

    for rail in [PaymentRail::Transfer, PaymentRail::CardGateway] {
        let result = ctx.engine.register_immediate_payment(RegisterImmediatePayment {
            rail,
            ..cash_payment(1000, PaymentPurpose::Other)
        });
        assert!(matches!(result, Err(AppError::Validation(_))), "{} accepted", rail);
    }
}

#[test]
fn immediate_payment_rejects_non_positive_amounts() {
    let ctx = setup();

    for amount in [0, -500] {
        let result = ctx
            .engine
            .register_immediate_payment(cash_payment(amount, PaymentPurpose::Other));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    let conn = ctx.db.get().unwrap();
    assert!(queries::list_payments(&conn, 10).unwrap().is_empty());
}

#[test]
fn immediate_payment_requires_existing_membership() {
    let ctx = setup();

    let result = ctx.engine.register_immediate_payment(RegisterImmediatePayment {
        refs: PaymentRefs {
            membership_id: Some("missing".to_string()),
            ..Default::default()
        },
        ..cash_payment(10_000, PaymentPurpose::Membership)
    });
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // Nothing was persisted: the validation runs inside the write transaction.
    let conn = ctx.db.get().unwrap();
    assert!(queries::list_payments(&conn, 10).unwrap().is_empty());
    assert_eq!(queries::count_movements(&conn).unwrap(), 0);
}

#[test]
fn cash_membership_payment_activates_expired_membership_from_today() {
    let ctx = setup();
    let conn = ctx.db.get().unwrap();
    let user = create_test_user(&conn, "expired@example.com");
    // Expired twenty days ago.
    let membership = create_test_membership(&conn, &user.id, now() - 20 * DAY_SECS);
    drop(conn);

    ctx.engine
        .register_immediate_payment(RegisterImmediatePayment {
            refs: membership_refs(&membership),
            ..cash_payment(30_000, PaymentPurpose::Membership)
        })
        .expect("membership payment should succeed");

    let conn = ctx.db.get().unwrap();
    let updated = queries::get_membership_by_id(&conn, &membership.id)
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, MembershipStatus::Active);
    // One billing period forward from today, not from the old end date.
    let expected = now() + 30 * DAY_SECS;
    assert!((updated.end_date - expected).abs() < 60, "end_date {} vs {}", updated.end_date, expected);
}

#[test]
fn cash_membership_payment_keeps_future_end_date() {
    let ctx = setup();
    let conn = ctx.db.get().unwrap();
    let user = create_test_user(&conn, "current@example.com");
    let future_end = now() + 10 * DAY_SECS;
    let membership = create_test_membership(&conn, &user.id, future_end);
    drop(conn);

    ctx.engine
        .register_immediate_payment(RegisterImmediatePayment {
            refs: membership_refs(&membership),
            ..cash_payment(30_000, PaymentPurpose::Membership)
        })
        .expect("membership payment should succeed");

    let conn = ctx.db.get().unwrap();
    let updated = queries::get_membership_by_id(&conn, &membership.id)
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, MembershipStatus::Active);
    assert_eq!(updated.end_date, future_end);
}

#[test]
fn movement_recording_is_idempotent_per_payment() {
    let ctx = setup();

    let payment = ctx
        .engine
        .register_immediate_payment(cash_payment(2500, PaymentPurpose::Other))
        .unwrap();

    let conn = ctx.db.get().unwrap();
    let first = queries::get_movement_by_reference(&conn, &payment.id, REF_TYPE_PAYMENT)
        .unwrap()
        .unwrap();

    // A second recording attempt returns the existing row instead of inserting.
    let second = effects::record_from_payment(&conn, &payment).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(queries::count_movements(&conn).unwrap(), 1);
}

#[test]
fn movement_recorder_refuses_non_completed_payments() {
    let ctx = setup();

    let payment = ctx
        .engine
        .register_transfer_payment(gymledger::engine::RegisterTransferPayment {
            amount_cents: 4000,
            purpose: PaymentPurpose::Other,
            refs: PaymentRefs::default(),
            actor_id: None,
            notes: None,
        })
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    let conn = ctx.db.get().unwrap();
    assert!(effects::record_from_payment(&conn, &payment).is_err());
    assert_eq!(queries::count_movements(&conn).unwrap(), 0);
}

#[test]
fn paying_for_store_order_marks_it_paid_and_clears_cart() {
    let ctx = setup();
    let conn = ctx.db.get().unwrap();
    let user = create_test_user(&conn, "shopper@example.com");
    let product = create_test_product(&conn, "BAR-001", 350, 10);
    queries::add_cart_item(&conn, &user.id, &product.id, 3).unwrap();
    drop(conn);

    let mut conn = ctx.db.get().unwrap();
    let order = gymledger::orders::create_order(
        &mut conn,
        &CreateOrder {
            user_id: Some(user.id.clone()),
            items: vec![OrderLineRequest {
                product_id: product.id.clone(),
                quantity: 2,
            }],
            discount_cents: 0,
            tax_cents: 0,
            shipping_cents: 0,
            notes: None,
        },
    )
    .unwrap();
    drop(conn);

    let payment = ctx
        .engine
        .register_immediate_payment(RegisterImmediatePayment {
            refs: order_refs(&order.order),
            ..cash_payment(order.order.total_cents, PaymentPurpose::StoreOrder)
        })
        .expect("order payment should succeed");
    assert_eq!(payment.status, PaymentStatus::Completed);

    let conn = ctx.db.get().unwrap();
    let paid = queries::get_order_by_id(&conn, &order.order.id).unwrap().unwrap();
    assert_eq!(paid.payment_status, OrderPaymentStatus::Paid);
    assert!(queries::list_cart_items(&conn, &user.id).unwrap().is_empty());

    let movement = queries::get_movement_by_reference(&conn, &payment.id, REF_TYPE_PAYMENT)
        .unwrap()
        .unwrap();
    assert_eq!(movement.category, MovementCategory::ProductsSale);
}
