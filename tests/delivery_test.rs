mod common;

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::post;
use common::*;
use paygate::domain::callback::CallbackOutcome;
use paygate::domain::provider::Provider;
use paygate::services::callbacks::process;
use paygate::services::payments::create_or_get;
use paygate::services::worker::{WorkerConfig, poll_once, run_worker};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};

// The worker polls the whole table, so these tests would steal each other's
// rows if they ran in parallel.
static SERIAL: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[derive(Clone)]
struct MerchantState {
    status: StatusCode,
    hits: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<serde_json::Value>>>,
}

async fn merchant_handler(
    State(state): State<MerchantState>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_body.lock().await = Some(body);
    state.status
}

/// Local merchant endpoint answering every webhook with a fixed status.
async fn spawn_merchant(status: StatusCode) -> (String, MerchantState) {
    let state = MerchantState {
        status,
        hits: Arc::new(AtomicUsize::new(0)),
        last_body: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/callback/payment", post(merchant_handler))
        .route("/callback/refund", post(merchant_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn worker_config(max_retries: i32) -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(50),
        batch_size: 10,
        max_retries,
        request_timeout: Duration::from_secs(5),
    }
}

async fn enqueued_payment_delivery(
    pool: &sqlx::PgPool,
    notify_base: &str,
    order_no: &str,
) -> (uuid::Uuid, String) {
    let app = create_app(pool, &format!("app_{order_no}"), Some(notify_base)).await;
    let draft = make_draft(order_no, Provider::Stripe, 1000, 1);
    let (payment, _) = create_or_get(pool, &app, &draft, None).await.unwrap();
    let event = make_payment_event(
        &format!("evt_{order_no}"),
        CallbackOutcome::Succeeded,
        Some(order_no),
        Some(&format!("pi_{order_no}")),
    );
    process(pool, &event).await.unwrap();
    (app.id, format!("{}_succeeded", payment.id))
}

// ── property 9: at-least-once to a responsive merchant ─────────────────────

#[tokio::test]
async fn delivery_succeeds_against_responsive_merchant() {
    let _guard = SERIAL.lock().await;
    let pool = setup_pool("paygate_test_delivery").await;
    let (base, merchant) = spawn_merchant(StatusCode::OK).await;
    let (app_id, event_id) = enqueued_payment_delivery(&pool, &base, "ord-ok").await;

    let client = reqwest::Client::new();
    poll_once(&pool, &client, &worker_config(10)).await.unwrap();

    let delivery = delivery_by_event_id(&pool, app_id, &event_id).await.unwrap();
    assert_eq!(delivery.status, "succeeded");
    assert_eq!(delivery.attempt_count, 1);
    assert!(delivery.delivered_at.is_some());
    assert!(delivery.next_attempt_at.is_none());
    assert_eq!(delivery.last_http_status, Some(200));
    assert_eq!(merchant.hits.load(Ordering::SeqCst), 1);

    // the merchant saw the documented payload shape
    let body = merchant.last_body.lock().await.clone().unwrap();
    assert_eq!(body["event_id"], event_id.as_str());
    assert_eq!(body["event_type"], "payment.succeeded");
    assert_eq!(body["merchant_order_no"], "ord-ok");
    assert_eq!(body["amount"], 1000);
    assert_eq!(body["currency"], "USD");

    // a successful row is never picked up again
    poll_once(&pool, &client, &worker_config(10)).await.unwrap();
    assert_eq!(merchant.hits.load(Ordering::SeqCst), 1);
}

// ── property 8: retry schedule ─────────────────────────────────────────────

#[tokio::test]
async fn failed_delivery_backs_off_exponentially_with_jitter() {
    let _guard = SERIAL.lock().await;
    let pool = setup_pool("paygate_test_delivery").await;
    let (base, _merchant) = spawn_merchant(StatusCode::INTERNAL_SERVER_ERROR).await;
    let (app_id, event_id) = enqueued_payment_delivery(&pool, &base, "ord-backoff").await;

    let client = reqwest::Client::new();
    poll_once(&pool, &client, &worker_config(10)).await.unwrap();

    let delivery = delivery_by_event_id(&pool, app_id, &event_id).await.unwrap();
    assert_eq!(delivery.status, "failed");
    assert_eq!(delivery.attempt_count, 1);
    assert_eq!(delivery.last_http_status, Some(500));
    assert!(delivery.last_error.as_deref().unwrap_or("").starts_with("HTTP 500"));

    // next_attempt_at - last_attempt_at within [2^1, 1.2 * 2^1], small slack
    // for the time between the claim stamp and the failure stamp
    let gap = (delivery.next_attempt_at.unwrap() - delivery.last_attempt_at.unwrap())
        .num_milliseconds() as f64
        / 1000.0;
    assert!(gap >= 2.0, "backoff too short: {gap}s");
    assert!(gap <= 2.5 + 1.0, "backoff too long: {gap}s");

    // not due yet: an immediate poll must not claim it
    poll_once(&pool, &client, &worker_config(10)).await.unwrap();
    let delivery = delivery_by_event_id(&pool, app_id, &event_id).await.unwrap();
    assert_eq!(delivery.attempt_count, 1);
}

// ── S4: retries exhausted → dead letter ────────────────────────────────────

#[tokio::test]
async fn failing_merchant_dead_letters_after_max_retries() {
    let _guard = SERIAL.lock().await;
    let pool = setup_pool("paygate_test_delivery").await;
    let (base, merchant) = spawn_merchant(StatusCode::INTERNAL_SERVER_ERROR).await;
    let (app_id, event_id) = enqueued_payment_delivery(&pool, &base, "ord-dead").await;

    let max_retries = 10;
    let client = reqwest::Client::new();
    for _ in 0..max_retries {
        force_delivery_due(&pool).await;
        poll_once(&pool, &client, &worker_config(max_retries)).await.unwrap();
    }

    let delivery = delivery_by_event_id(&pool, app_id, &event_id).await.unwrap();
    assert_eq!(delivery.status, "dead");
    assert_eq!(delivery.attempt_count, max_retries);
    assert!(delivery.next_attempt_at.is_none());
    assert!(delivery.last_error.is_some());
    assert_eq!(merchant.hits.load(Ordering::SeqCst), max_retries as usize);

    // dead is terminal: nothing more is attempted
    force_delivery_due(&pool).await;
    poll_once(&pool, &client, &worker_config(max_retries)).await.unwrap();
    assert_eq!(merchant.hits.load(Ordering::SeqCst), max_retries as usize);
}

// ── transport errors are retried too ───────────────────────────────────────

#[tokio::test]
async fn unreachable_merchant_schedules_retry() {
    let _guard = SERIAL.lock().await;
    let pool = setup_pool("paygate_test_delivery").await;
    // no listener behind this port
    let (app_id, event_id) =
        enqueued_payment_delivery(&pool, "http://127.0.0.1:9", "ord-unreachable").await;

    let client = reqwest::Client::new();
    poll_once(&pool, &client, &worker_config(10)).await.unwrap();

    let delivery = delivery_by_event_id(&pool, app_id, &event_id).await.unwrap();
    assert_eq!(delivery.status, "failed");
    assert_eq!(delivery.last_http_status, None);
    assert!(
        delivery
            .last_error
            .as_deref()
            .unwrap_or("")
            .starts_with("RequestError:")
    );
}

// ── worker loop lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn worker_delivers_in_background_and_honors_shutdown() {
    let _guard = SERIAL.lock().await;
    let pool = setup_pool("paygate_test_delivery").await;
    let (base, merchant) = spawn_merchant(StatusCode::OK).await;
    let (app_id, event_id) = enqueued_payment_delivery(&pool, &base, "ord-loop").await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_worker(pool.clone(), worker_config(10), shutdown_rx));

    // wait for the poll loop to pick the row up
    let mut delivered = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if merchant.hits.load(Ordering::SeqCst) > 0 {
            delivered = true;
            break;
        }
    }
    assert!(delivered, "worker never delivered the webhook");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not shut down")
        .unwrap();

    let delivery = delivery_by_event_id(&pool, app_id, &event_id).await.unwrap();
    assert_eq!(delivery.status, "succeeded");
}
