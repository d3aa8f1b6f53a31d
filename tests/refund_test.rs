mod common;

use common::*;
use paygate::domain::callback::CallbackOutcome;
use paygate::domain::error::GatewayError;
use paygate::domain::provider::{Provider, ProviderRefundStatus};
use paygate::services::callbacks::process;
use paygate::services::payments::create_or_get;
use paygate::services::refunds::{
    RefundDraft, create_refund, get_refund, list_refunds_by_payment, sync_refund_status,
};
use uuid::Uuid;

async fn succeeded_payment(
    pool: &sqlx::PgPool,
    app: &paygate::domain::app::App,
    order_no: &str,
    unit_amount: i64,
) -> paygate::domain::payment::Payment {
    let draft = make_draft(order_no, Provider::Stripe, unit_amount, 1);
    let (payment, _) = create_or_get(pool, app, &draft, None).await.unwrap();
    let event = make_payment_event(
        &format!("evt_setup_{order_no}"),
        CallbackOutcome::Succeeded,
        Some(order_no),
        Some(&format!("pi_{order_no}")),
    );
    process(pool, &event).await.unwrap();
    paygate::services::payments::get_by_id(pool, app, payment.id)
        .await
        .unwrap()
}

// ── S5: cumulative cap ─────────────────────────────────────────────────────

#[tokio::test]
async fn cumulative_refunds_never_exceed_payment_amount() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_cap", Some("https://m.example/hook")).await;
    let registry = stub_registry(ProviderRefundStatus::Succeeded);

    let payment = succeeded_payment(&pool, &app, "ord-cap", 1000).await;

    // 600 fits
    let first = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(600),
            reason: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(first.status.as_str(), "succeeded");
    assert!(first.refunded_at.is_some());

    // 500 would bring the total to 1100
    let err = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(500),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));

    // 400 lands exactly on the cap
    let third = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(400),
            reason: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(third.status.as_str(), "succeeded");

    // and now the payment is fully refunded
    let err = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(1),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));
}

#[tokio::test]
async fn pending_refunds_count_against_the_cap() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_cap_pending", None).await;
    let registry = stub_registry(ProviderRefundStatus::Pending);

    let payment = succeeded_payment(&pool, &app, "ord-cap-pending", 1000).await;

    let refund = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(700),
            reason: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(refund.status.as_str(), "pending");
    assert!(refund.refunded_at.is_none());

    let err = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(400),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));
}

// ── preconditions ──────────────────────────────────────────────────────────

#[tokio::test]
async fn refund_requires_succeeded_payment() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_pending_pay", None).await;
    let registry = stub_registry(ProviderRefundStatus::Succeeded);

    let draft = make_draft("ord-still-pending", Provider::Stripe, 1000, 1);
    let (payment, _) = create_or_get(&pool, &app, &draft, None).await.unwrap();

    let err = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(100),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));
}

#[tokio::test]
async fn refund_amount_above_payment_rejected() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_above", None).await;
    let registry = stub_registry(ProviderRefundStatus::Succeeded);

    let payment = succeeded_payment(&pool, &app, "ord-above", 1000).await;
    let err = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(1001),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));
}

#[tokio::test]
async fn missing_amount_means_full_refund() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_full", None).await;
    let registry = stub_registry(ProviderRefundStatus::Succeeded);

    let payment = succeeded_payment(&pool, &app, "ord-full", 1250).await;
    let refund = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: None,
            reason: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(refund.refund_amount.minor_units(), 1250);
}

#[tokio::test]
async fn refund_for_unknown_payment_is_not_found() {
    let pool = setup_pool("paygate_test_refund").await;
    let registry = stub_registry(ProviderRefundStatus::Succeeded);

    let err = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: Uuid::now_v7(),
            refund_amount: Some(100),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
}

// ── listing & sync ─────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_pages_newest_first() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_list", None).await;
    let registry = stub_registry(ProviderRefundStatus::Succeeded);

    let payment = succeeded_payment(&pool, &app, "ord-list", 1000).await;
    for amount in [100, 200, 300] {
        create_refund(
            &pool,
            &registry,
            &RefundDraft {
                payment_id: payment.id,
                refund_amount: Some(amount),
                reason: None,
            },
        )
        .await
        .unwrap();
    }

    let (page, total) = list_refunds_by_payment(&pool, payment.id, 0, 2).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);

    let (rest, _) = list_refunds_by_payment(&pool, payment.id, 2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);
}

#[tokio::test]
async fn sync_is_noop_on_terminal_refund() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_sync_noop", None).await;
    let registry = stub_registry(ProviderRefundStatus::Succeeded);

    let payment = succeeded_payment(&pool, &app, "ord-sync-noop", 500).await;
    let refund = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(500),
            reason: None,
        },
    )
    .await
    .unwrap();

    let synced = sync_refund_status(&pool, &registry, refund.id).await.unwrap();
    assert_eq!(synced.status, refund.status);
}

#[tokio::test]
async fn sync_pulls_provider_state_for_pending_refund() {
    let pool = setup_pool("paygate_test_refund").await;
    let app = create_app(&pool, "app_sync_pull", None).await;
    // create as pending; the stub's get_refund answers succeeded
    let registry = stub_registry(ProviderRefundStatus::Pending);

    let payment = succeeded_payment(&pool, &app, "ord-sync-pull", 500).await;
    let refund = create_refund(
        &pool,
        &registry,
        &RefundDraft {
            payment_id: payment.id,
            refund_amount: Some(500),
            reason: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(refund.status.as_str(), "pending");

    let synced = sync_refund_status(&pool, &registry, refund.id).await.unwrap();
    assert_eq!(synced.status.as_str(), "succeeded");
    assert!(synced.refunded_at.is_some());

    let fetched = get_refund(&pool, refund.id).await.unwrap();
    assert_eq!(fetched.status.as_str(), "succeeded");
}
