use {
    crate::domain::callback::{CallbackEvent, CallbackStatus},
    crate::domain::error::GatewayError,
    sqlx::postgres::PgExecutor,
    uuid::Uuid,
};

/// What the dedup insert found.
pub enum IngestOutcome {
    /// Row newly created with status `processing`.
    New(Uuid),
    /// Row already existed; carries its current status. `processed` rows are
    /// idempotent replays, anything else is a crash-resume.
    Existing(Uuid, CallbackStatus),
}

/// Record an inbound event in the inbox, deduplicated on
/// `(provider, provider_event_id)`.
pub async fn ingest(
    executor: impl PgExecutor<'_> + Copy,
    event: &CallbackEvent,
) -> Result<IngestOutcome, GatewayError> {
    let inserted: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO callbacks (id, provider, provider_event_id, provider_txn_id, payload, status)
        VALUES ($1, $2, $3, $4, $5, 'processing')
        ON CONFLICT (provider, provider_event_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(event.provider.as_str())
    .bind(&event.provider_event_id)
    .bind(&event.provider_txn_id)
    .bind(&event.raw_payload)
    .fetch_optional(executor)
    .await?;

    if let Some(id) = inserted {
        return Ok(IngestOutcome::New(id));
    }

    let (id, status): (Uuid, String) = sqlx::query_as(
        "SELECT id, status FROM callbacks WHERE provider = $1 AND provider_event_id = $2",
    )
    .bind(event.provider.as_str())
    .bind(&event.provider_event_id)
    .fetch_one(executor)
    .await?;

    Ok(IngestOutcome::Existing(
        id,
        CallbackStatus::try_from(status.as_str())?,
    ))
}

/// Target could not be located; the row keeps the payload for the operator.
pub async fn mark_failed(
    executor: impl PgExecutor<'_>,
    callback_id: Uuid,
) -> Result<(), GatewayError> {
    sqlx::query("UPDATE callbacks SET status = 'failed' WHERE id = $1")
        .bind(callback_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Finalize: link the located payment and stamp `processed`. A processed row
/// is immutable from here on.
pub async fn mark_processed(
    executor: impl PgExecutor<'_>,
    callback_id: Uuid,
    payment_id: Option<Uuid>,
) -> Result<(), GatewayError> {
    sqlx::query(
        "UPDATE callbacks SET status = 'processed', payment_id = $1, processed_at = now() WHERE id = $2",
    )
    .bind(payment_id)
    .bind(callback_id)
    .execute(executor)
    .await?;
    Ok(())
}
