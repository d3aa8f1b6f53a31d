use {
    super::auth::ApiApp,
    super::errors::{ApiError, envelope},
    crate::AppState,
    crate::domain::money::Currency,
    crate::domain::payment::{Payment, PaymentDraft},
    crate::domain::provider::Provider,
    crate::services::payments,
    axum::{
        Json,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub merchant_order_no: String,
    pub provider: Provider,
    pub currency: Currency,
    pub unit_amount: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub notify_url: Option<String>,
    pub expire_minutes: Option<i64>,
    pub product_name: Option<String>,
    pub product_desc: Option<String>,
}

impl From<CreatePaymentRequest> for PaymentDraft {
    fn from(req: CreatePaymentRequest) -> Self {
        Self {
            merchant_order_no: req.merchant_order_no,
            provider: req.provider,
            unit_amount: req.unit_amount,
            quantity: req.quantity,
            currency: req.currency,
            notify_url: req.notify_url,
            expire_minutes: req.expire_minutes,
            product_name: req.product_name,
            product_desc: req.product_desc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentBody {
    pub payment_id: Uuid,
    pub merchant_order_no: String,
    pub provider: Provider,
    pub amount: i64,
    pub currency: Currency,
    pub status: String,
    pub provider_txn_id: Option<String>,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Payment> for PaymentBody {
    fn from(p: &Payment) -> Self {
        Self {
            payment_id: p.id,
            merchant_order_no: p.merchant_order_no.clone(),
            provider: p.provider,
            amount: p.amount.minor_units(),
            currency: p.currency,
            status: p.status.as_str().to_string(),
            provider_txn_id: p.provider_txn_id.clone(),
            paid_at: p.paid_at,
            created_at: p.created_at,
        }
    }
}

/// POST /v1/payments — create or idempotently return a payment.
pub async fn create_payment(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    headers: HeaderMap,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Response, ApiError> {
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok());

    let draft = PaymentDraft::from(req);
    let (payment, is_new, provider_result) = payments::place_order(
        &state.pool,
        &state.registry,
        &app,
        &draft,
        idempotency_key,
        state.settings.payment_expire_minutes_default,
    )
    .await?;

    let data = serde_json::json!({
        "payment_id": payment.id,
        "merchant_order_no": payment.merchant_order_no,
        "status": payment.status.as_str(),
        "type": provider_result.as_ref().map(|r| r.pay_type.as_str()),
        "payload": provider_result.as_ref().map(|r| r.payload.clone()),
    });

    if is_new {
        Ok((StatusCode::CREATED, envelope(data, "payment created")).into_response())
    } else {
        Ok(envelope(data, "payment already exists").into_response())
    }
}

/// GET /v1/payments/{payment_id}
pub async fn get_payment_by_id(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payment = payments::get_by_id(&state.pool, &app, payment_id).await?;
    Ok(envelope(PaymentBody::from(&payment), "ok"))
}

/// GET /v1/payments/by-merchant-order/{merchant_order_no}
pub async fn get_payment_by_merchant_order_no(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    Path(merchant_order_no): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payment =
        payments::get_by_merchant_order_no(&state.pool, &app, &merchant_order_no).await?;
    Ok(envelope(PaymentBody::from(&payment), "ok"))
}

#[derive(Debug, Deserialize)]
pub struct CancelPaymentRequest {
    pub merchant_order_no: String,
}

/// POST /v1/payments/cancel — cancel a non-terminal payment.
pub async fn cancel_payment(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    Json(req): Json<CancelPaymentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (payment, outcome) = payments::cancel(
        &state.pool,
        &state.registry,
        &app,
        &req.merchant_order_no,
    )
    .await?;

    let data = serde_json::json!({
        "payment": PaymentBody::from(&payment),
        "canceled": outcome.success,
        "message": outcome.message,
    });
    let msg = if outcome.success {
        "payment canceled"
    } else {
        "payment could not be canceled"
    };
    Ok(envelope(data, msg))
}
