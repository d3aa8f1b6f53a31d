mod common;

use common::*;
use paygate::domain::error::GatewayError;
use paygate::domain::money::Currency;
use paygate::domain::payment::PaymentStatus;
use paygate::domain::provider::Provider;
use paygate::services::payments::{create_or_get, get_by_id, get_by_merchant_order_no, update_status};
use uuid::Uuid;

// ── create_or_get idempotency ──────────────────────────────────────────────

#[tokio::test]
async fn create_then_replay_returns_same_row() {
    let pool = setup_pool("paygate_test_payment").await;
    let app = create_app(&pool, "app_replay", Some("https://m.example/hook")).await;

    let draft = make_draft("ord-replay-1", Provider::Stripe, 1000, 2);
    let (first, is_new) = create_or_get(&pool, &app, &draft, None).await.unwrap();
    assert!(is_new);
    assert_eq!(first.amount.minor_units(), 2000);
    assert_eq!(first.status, PaymentStatus::Pending);
    // notify_url falls back to the app default
    assert_eq!(first.notify_url.as_deref(), Some("https://m.example/hook"));

    let (second, is_new) = create_or_get(&pool, &app, &draft, None).await.unwrap();
    assert!(!is_new);
    assert_eq!(second.id, first.id);
    assert_eq!(count_payments(&pool, app.id, "ord-replay-1").await, 1);
}

#[tokio::test]
async fn conflicting_params_rejected_and_row_unchanged() {
    let pool = setup_pool("paygate_test_payment").await;
    let app = create_app(&pool, "app_conflict", None).await;

    let draft = make_draft("ord-conflict-1", Provider::Stripe, 100, 1);
    let (first, _) = create_or_get(&pool, &app, &draft, None).await.unwrap();

    // same order number, different provider
    let mut other = make_draft("ord-conflict-1", Provider::Alipay, 100, 1);
    let err = create_or_get(&pool, &app, &other, None).await.unwrap_err();
    match err {
        GatewayError::Conflict { details, .. } => {
            assert_eq!(details["existing"]["provider"], "stripe");
            assert_eq!(details["request"]["provider"], "alipay");
        }
        other => panic!("expected Conflict, got: {other:?}"),
    }

    // different amount
    other = make_draft("ord-conflict-1", Provider::Stripe, 999, 1);
    assert!(matches!(
        create_or_get(&pool, &app, &other, None).await,
        Err(GatewayError::Conflict { .. })
    ));

    // different currency
    other = make_draft("ord-conflict-1", Provider::Stripe, 100, 1);
    other.currency = Currency::Eur;
    assert!(matches!(
        create_or_get(&pool, &app, &other, None).await,
        Err(GatewayError::Conflict { .. })
    ));

    // the stored row is untouched
    let (status, _) = payment_status(&pool, first.id).await;
    assert_eq!(status, "pending");
    assert_eq!(count_payments(&pool, app.id, "ord-conflict-1").await, 1);
}

#[tokio::test]
async fn zero_amount_rejected() {
    let pool = setup_pool("paygate_test_payment").await;
    let app = create_app(&pool, "app_zero", None).await;

    let draft = make_draft("ord-zero", Provider::Stripe, 0, 3);
    assert!(matches!(
        create_or_get(&pool, &app, &draft, None).await,
        Err(GatewayError::Validation(_))
    ));
}

// ── scoped reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn reads_are_app_scoped() {
    let pool = setup_pool("paygate_test_payment").await;
    let owner = create_app(&pool, "app_owner", None).await;
    let intruder = create_app(&pool, "app_intruder", None).await;

    let draft = make_draft("ord-scope-1", Provider::Stripe, 500, 1);
    let (payment, _) = create_or_get(&pool, &owner, &draft, None).await.unwrap();

    assert!(get_by_id(&pool, &owner, payment.id).await.is_ok());
    assert!(
        get_by_merchant_order_no(&pool, &owner, "ord-scope-1")
            .await
            .is_ok()
    );

    // another app's rows are indistinguishable from absent ones
    assert!(matches!(
        get_by_id(&pool, &intruder, payment.id).await,
        Err(GatewayError::NotFound(_))
    ));
    assert!(matches!(
        get_by_merchant_order_no(&pool, &intruder, "ord-scope-1").await,
        Err(GatewayError::NotFound(_))
    ));
    assert!(matches!(
        get_by_id(&pool, &owner, Uuid::now_v7()).await,
        Err(GatewayError::NotFound(_))
    ));
}

// ── update_status ──────────────────────────────────────────────────────────

#[tokio::test]
async fn update_status_sets_paid_at_and_backfills_txn_id() {
    let pool = setup_pool("paygate_test_payment").await;
    let app = create_app(&pool, "app_update", None).await;

    let draft = make_draft("ord-update-1", Provider::Stripe, 700, 1);
    let (payment, _) = create_or_get(&pool, &app, &draft, None).await.unwrap();
    assert!(payment.paid_at.is_none());

    let mut tx = pool.begin().await.unwrap();
    let updated = update_status(&mut tx, payment.id, PaymentStatus::Succeeded, Some("pi_upd"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(updated.status, PaymentStatus::Succeeded);
    assert!(updated.paid_at.is_some());
    assert_eq!(updated.provider_txn_id.as_deref(), Some("pi_upd"));
}

#[tokio::test]
async fn update_status_rejects_terminal_source() {
    let pool = setup_pool("paygate_test_payment").await;
    let app = create_app(&pool, "app_terminal", None).await;

    let draft = make_draft("ord-terminal-1", Provider::Stripe, 700, 1);
    let (payment, _) = create_or_get(&pool, &app, &draft, None).await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    update_status(&mut tx, payment.id, PaymentStatus::Failed, None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let err = update_status(&mut tx, payment.id, PaymentStatus::Succeeded, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));
    drop(tx);

    let (status, paid_at) = payment_status(&pool, payment.id).await;
    assert_eq!(status, "failed");
    assert!(paid_at.is_none());
}
