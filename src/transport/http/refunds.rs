use {
    super::auth::ApiApp,
    super::errors::{ApiError, envelope},
    crate::AppState,
    crate::domain::app::App,
    crate::domain::error::GatewayError,
    crate::domain::provider::Provider,
    crate::domain::refund::Refund,
    crate::services::{payments, refunds},
    axum::{
        Json,
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub payment_id: Uuid,
    /// Absent means full refund.
    pub refund_amount: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundBody {
    pub refund_id: Uuid,
    pub payment_id: Uuid,
    pub refund_amount: i64,
    pub reason: Option<String>,
    pub status: String,
    pub provider: Provider,
    pub provider_refund_id: Option<String>,
    pub refunded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Refund> for RefundBody {
    fn from(r: &Refund) -> Self {
        Self {
            refund_id: r.id,
            payment_id: r.payment_id,
            refund_amount: r.refund_amount.minor_units(),
            reason: r.reason.clone(),
            status: r.status.as_str().to_string(),
            provider: r.provider,
            provider_refund_id: r.provider_refund_id.clone(),
            refunded_at: r.refunded_at,
            created_at: r.created_at,
        }
    }
}

/// Refunds are reached through their payment; a refund whose payment belongs
/// to another app must look absent.
async fn get_scoped_refund(
    state: &AppState,
    app: &App,
    refund_id: Uuid,
) -> Result<Refund, ApiError> {
    let refund = refunds::get_refund(&state.pool, refund_id).await?;
    payments::get_by_id(&state.pool, app, refund.payment_id)
        .await
        .map_err(|_| GatewayError::NotFound(format!("refund not found: {refund_id}")))?;
    Ok(refund)
}

/// POST /v1/refunds — create a refund against a succeeded payment.
pub async fn create_refund(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    Json(req): Json<CreateRefundRequest>,
) -> Result<Response, ApiError> {
    // Scope check before touching refund machinery.
    payments::get_by_id(&state.pool, &app, req.payment_id).await?;

    let refund = refunds::create_refund(
        &state.pool,
        &state.registry,
        &refunds::RefundDraft {
            payment_id: req.payment_id,
            refund_amount: req.refund_amount,
            reason: req.reason,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        envelope(RefundBody::from(&refund), "refund created"),
    )
        .into_response())
}

/// GET /v1/refunds/{refund_id}
pub async fn get_refund(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    Path(refund_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let refund = get_scoped_refund(&state, &app, refund_id).await?;
    Ok(envelope(RefundBody::from(&refund), "ok"))
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// GET /v1/payments/{payment_id}/refunds — paged refund list.
pub async fn list_refunds(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    Path(payment_id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    payments::get_by_id(&state.pool, &app, payment_id).await?;

    let (refunds, total) =
        refunds::list_refunds_by_payment(&state.pool, payment_id, page.offset, page.limit).await?;

    let data = serde_json::json!({
        "total": total,
        "items": refunds.iter().map(RefundBody::from).collect::<Vec<_>>(),
    });
    Ok(envelope(data, "ok"))
}

/// POST /v1/refunds/{refund_id}/sync — pull provider refund status.
pub async fn sync_refund(
    State(state): State<AppState>,
    ApiApp(app): ApiApp,
    Path(refund_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    get_scoped_refund(&state, &app, refund_id).await?;
    let refund = refunds::sync_refund_status(&state.pool, &state.registry, refund_id).await?;
    Ok(envelope(RefundBody::from(&refund), "refund status synced"))
}
