use {
    crate::domain::error::GatewayError,
    crate::domain::money::Amount,
    crate::domain::provider::Provider,
    crate::domain::refund::{NewRefund, Refund, RefundStatus},
    chrono::{DateTime, Utc},
    sqlx::postgres::PgExecutor,
    uuid::Uuid,
};

const COLUMNS: &str = "id, payment_id, refund_amount, reason, status, provider, \
     provider_refund_id, extra_data, refunded_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RefundRecord {
    id: Uuid,
    payment_id: Uuid,
    refund_amount: i64,
    reason: Option<String>,
    status: String,
    provider: String,
    provider_refund_id: Option<String>,
    extra_data: Option<serde_json::Value>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RefundRecord {
    fn into_refund(self) -> Result<Refund, GatewayError> {
        Ok(Refund {
            id: self.id,
            payment_id: self.payment_id,
            refund_amount: Amount::new(self.refund_amount)?,
            reason: self.reason,
            status: RefundStatus::try_from(self.status.as_str())?,
            provider: Provider::try_from(self.provider.as_str())?,
            provider_refund_id: self.provider_refund_id,
            extra_data: self.extra_data,
            refunded_at: self.refunded_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Insert a refund row. `refunded_at` is stamped iff the row is born
/// succeeded (synchronous provider refunds).
pub async fn insert(executor: impl PgExecutor<'_>, refund: &NewRefund) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        INSERT INTO refunds
            (id, payment_id, refund_amount, reason, status, provider,
             provider_refund_id, extra_data, refunded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                CASE WHEN $5 = 'succeeded' THEN now() ELSE NULL END)
        "#,
    )
    .bind(refund.id)
    .bind(refund.payment_id)
    .bind(refund.refund_amount.minor_units())
    .bind(&refund.reason)
    .bind(refund.status.as_str())
    .bind(refund.provider.as_str())
    .bind(&refund.provider_refund_id)
    .bind(&refund.extra_data)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(
    executor: impl PgExecutor<'_>,
    refund_id: Uuid,
) -> Result<Option<Refund>, GatewayError> {
    let row: Option<RefundRecord> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM refunds WHERE id = $1"))
            .bind(refund_id)
            .fetch_optional(executor)
            .await?;
    row.map(RefundRecord::into_refund).transpose()
}

/// Refund callback target location.
pub async fn find_by_provider_refund_id(
    executor: impl PgExecutor<'_>,
    provider: Provider,
    provider_refund_id: &str,
) -> Result<Option<Refund>, GatewayError> {
    let row: Option<RefundRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM refunds WHERE provider = $1 AND provider_refund_id = $2"
    ))
    .bind(provider.as_str())
    .bind(provider_refund_id)
    .fetch_optional(executor)
    .await?;
    row.map(RefundRecord::into_refund).transpose()
}

/// Re-read a refund under a row lock for a state transition.
pub async fn lock(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    refund_id: Uuid,
) -> Result<Option<Refund>, GatewayError> {
    let row: Option<RefundRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM refunds WHERE id = $1 FOR UPDATE"
    ))
    .bind(refund_id)
    .fetch_optional(&mut **tx)
    .await?;
    row.map(RefundRecord::into_refund).transpose()
}

/// Minor units already claimed against the payment by refunds that hold funds
/// (pending or succeeded). Run with the parent payment row locked.
pub async fn sum_holding(
    executor: impl PgExecutor<'_>,
    payment_id: Uuid,
) -> Result<i64, GatewayError> {
    let sum: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT SUM(refund_amount)::BIGINT FROM refunds
        WHERE payment_id = $1 AND status IN ('pending', 'succeeded')
        "#,
    )
    .bind(payment_id)
    .fetch_one(executor)
    .await?;
    Ok(sum.unwrap_or(0))
}

pub async fn list_by_payment(
    executor: impl PgExecutor<'_> + Copy,
    payment_id: Uuid,
    offset: i64,
    limit: i64,
) -> Result<(Vec<Refund>, i64), GatewayError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refunds WHERE payment_id = $1")
        .bind(payment_id)
        .fetch_one(executor)
        .await?;

    let rows: Vec<RefundRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM refunds WHERE payment_id = $1 \
         ORDER BY created_at DESC OFFSET $2 LIMIT $3"
    ))
    .bind(payment_id)
    .bind(offset)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    let refunds = rows
        .into_iter()
        .map(RefundRecord::into_refund)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((refunds, total))
}

/// Advance the status of a locked row. Stamps `refunded_at` exactly when the
/// row transitions to succeeded.
pub async fn apply_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    refund_id: Uuid,
    new_status: RefundStatus,
) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        UPDATE refunds
        SET status = $1,
            refunded_at = CASE WHEN $1 = 'succeeded' THEN COALESCE(refunded_at, now()) ELSE refunded_at END,
            updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(new_status.as_str())
    .bind(refund_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
