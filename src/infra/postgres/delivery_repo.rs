use {
    crate::domain::delivery::{DeliveryStatus, NewDelivery, WebhookDelivery},
    crate::domain::error::GatewayError,
    chrono::{DateTime, Utc},
    sqlx::postgres::PgExecutor,
    std::time::Duration,
    uuid::Uuid,
};

const COLUMNS: &str = "id, app_id, payment_id, event_id, event_type, notify_url, payload, \
     status, attempt_count, next_attempt_at, last_attempt_at, last_http_status, \
     last_error, delivered_at, created_at";

#[derive(sqlx::FromRow)]
struct DeliveryRecord {
    id: Uuid,
    app_id: Uuid,
    payment_id: Option<Uuid>,
    event_id: String,
    event_type: String,
    notify_url: String,
    payload: serde_json::Value,
    status: String,
    attempt_count: i32,
    next_attempt_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    last_http_status: Option<i32>,
    last_error: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl DeliveryRecord {
    fn into_delivery(self) -> Result<WebhookDelivery, GatewayError> {
        Ok(WebhookDelivery {
            id: self.id,
            app_id: self.app_id,
            payment_id: self.payment_id,
            event_id: self.event_id,
            event_type: self.event_type,
            notify_url: self.notify_url,
            payload: self.payload,
            status: DeliveryStatus::try_from(self.status.as_str())?,
            attempt_count: self.attempt_count,
            next_attempt_at: self.next_attempt_at,
            last_attempt_at: self.last_attempt_at,
            last_http_status: self.last_http_status,
            last_error: self.last_error,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
        })
    }
}

/// Enqueue keyed by `(app_id, event_id)`. A second transition into the same
/// terminal state is a retry request: the existing row is re-armed with fresh
/// payload and zeroed counters and diagnostics.
pub async fn upsert(executor: impl PgExecutor<'_>, d: &NewDelivery) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        INSERT INTO webhook_deliveries
            (id, app_id, payment_id, event_id, event_type, notify_url, payload,
             status, attempt_count, next_attempt_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', 0, now())
        ON CONFLICT (app_id, event_id) DO UPDATE
        SET notify_url = EXCLUDED.notify_url,
            payload = EXCLUDED.payload,
            status = 'pending',
            attempt_count = 0,
            next_attempt_at = now(),
            last_attempt_at = NULL,
            last_http_status = NULL,
            last_error = NULL,
            delivered_at = NULL,
            updated_at = now()
        "#,
    )
    .bind(d.id)
    .bind(d.app_id)
    .bind(d.payment_id)
    .bind(&d.event_id)
    .bind(&d.event_type)
    .bind(&d.notify_url)
    .bind(&d.payload)
    .execute(executor)
    .await?;
    Ok(())
}

/// Claim up to `limit` due rows for delivery: pending or failed, retries left,
/// backoff elapsed. The claim itself marks the attempt (status `processing`,
/// counter bumped, `last_attempt_at` stamped) so a crashed worker leaves an
/// attributable row behind. SKIP LOCKED keeps concurrent workers out of each
/// other's way.
pub async fn claim_due(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    limit: i64,
    max_retries: i32,
) -> Result<Vec<WebhookDelivery>, GatewayError> {
    let rows: Vec<DeliveryRecord> = sqlx::query_as(&format!(
        r#"
        UPDATE webhook_deliveries
        SET status = 'processing',
            attempt_count = attempt_count + 1,
            last_attempt_at = now(),
            updated_at = now()
        WHERE id IN (
            SELECT id FROM webhook_deliveries
            WHERE status IN ('pending', 'failed')
              AND attempt_count < $1
              AND (next_attempt_at IS NULL OR next_attempt_at <= now())
            ORDER BY created_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {COLUMNS}
        "#
    ))
    .bind(max_retries)
    .bind(limit)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(DeliveryRecord::into_delivery).collect()
}

pub async fn mark_succeeded(
    executor: impl PgExecutor<'_>,
    delivery_id: Uuid,
    http_status: i32,
) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'succeeded', delivered_at = now(), next_attempt_at = NULL,
            last_http_status = $1, updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(http_status)
    .bind(delivery_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Record a failed attempt and schedule the next one.
pub async fn mark_failed_retry(
    executor: impl PgExecutor<'_>,
    delivery_id: Uuid,
    http_status: Option<i32>,
    error: &str,
    delay: Duration,
) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'failed',
            next_attempt_at = now() + make_interval(secs => $1),
            last_http_status = $2, last_error = $3, updated_at = now()
        WHERE id = $4
        "#,
    )
    .bind(delay.as_secs_f64())
    .bind(http_status)
    .bind(error)
    .bind(delivery_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Reset rows stuck in `processing` (worker died mid-delivery) back to
/// `failed` so the poll loop retries them. The attempt that stranded them was
/// already counted by the claim. Returns the number of reaped rows.
pub async fn reap_stuck(executor: impl PgExecutor<'_>) -> Result<u64, GatewayError> {
    let result = sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'failed', next_attempt_at = now(), updated_at = now()
        WHERE status = 'processing' AND last_attempt_at < now() - interval '2 minutes'
        "#,
    )
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Retries exhausted: park the row as a dead letter. Never picked up again.
pub async fn mark_dead(
    executor: impl PgExecutor<'_>,
    delivery_id: Uuid,
    http_status: Option<i32>,
    error: &str,
) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'dead', next_attempt_at = NULL,
            last_http_status = $1, last_error = $2, updated_at = now()
        WHERE id = $3
        "#,
    )
    .bind(http_status)
    .bind(error)
    .bind(delivery_id)
    .execute(executor)
    .await?;
    Ok(())
}
