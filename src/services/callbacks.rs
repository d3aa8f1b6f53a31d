use {
    crate::domain::callback::{CallbackEvent, CallbackStatus},
    crate::domain::delivery::NewDelivery,
    crate::domain::error::GatewayError,
    crate::domain::payment::Payment,
    crate::domain::refund::Refund,
    crate::infra::postgres::{app_repo, callback_repo, delivery_repo, payment_repo, refund_repo},
    sqlx::PgPool,
    uuid::Uuid,
};

/// What processing an inbound event amounted to.
#[derive(Debug)]
pub enum CallbackResult {
    /// Target state advanced; outbound delivery enqueued where applicable.
    Processed(Uuid),
    /// No state change, but the matching delivery was re-armed (same terminal
    /// reported again by a distinct event, or a crash-resume re-drive).
    Requeued(Uuid),
    /// Terminal state is sticky, or the mapped status equals the current
    /// non-actionable one; nothing to do.
    Untouched(Uuid),
    /// Duplicate of an already-processed event.
    Replay,
    /// No payment/refund matches the event; inbox row marked failed.
    Orphaned,
    /// Ingested, but processing failed and rolled back; the row stays in
    /// `processing` and a provider retry or an operator re-drives it.
    Deferred,
}

/// Process one canonical inbound event.
///
/// The inbox insert commits on its own: a crash mid-processing leaves the row
/// in `processing` so a provider retry (or an operator) can re-drive it. The
/// locate/advance/enqueue/finalize steps run in a single transaction.
pub async fn process(pool: &PgPool, event: &CallbackEvent) -> Result<CallbackResult, GatewayError> {
    let callback_id = match callback_repo::ingest(pool, event).await? {
        callback_repo::IngestOutcome::New(id) => id,
        callback_repo::IngestOutcome::Existing(_, CallbackStatus::Processed) => {
            tracing::info!(
                provider_event_id = %event.provider_event_id,
                "duplicate event, already processed"
            );
            return Ok(CallbackResult::Replay);
        }
        callback_repo::IngestOutcome::Existing(id, _) => {
            tracing::info!(
                provider_event_id = %event.provider_event_id,
                "resuming partially processed event"
            );
            id
        }
    };

    let attempt = async {
        let mut tx = pool.begin().await?;
        let result = if event.outcome.is_refund() {
            advance_refund(&mut tx, callback_id, event).await?
        } else {
            advance_payment(&mut tx, callback_id, event).await?
        };
        tx.commit().await?;
        Ok::<_, GatewayError>(result)
    }
    .await;

    match attempt {
        Ok(result) => Ok(result),
        Err(e) => {
            // The event is already tracked; answering the provider with an
            // error would only replay something we can re-drive ourselves.
            tracing::error!(
                provider_event_id = %event.provider_event_id,
                error = %e,
                "callback processing failed, inbox row left in processing"
            );
            Ok(CallbackResult::Deferred)
        }
    }
}

async fn locate_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &CallbackEvent,
) -> Result<Option<Payment>, GatewayError> {
    if let Some(order_no) = &event.merchant_order_no {
        if let Some(p) = payment_repo::find_by_order_any_app(&mut **tx, order_no).await? {
            return Ok(Some(p));
        }
    }
    if let Some(txn_id) = &event.provider_txn_id {
        if let Some(p) = payment_repo::find_by_provider_txn(&mut **tx, event.provider, txn_id).await?
        {
            return Ok(Some(p));
        }
    }
    Ok(None)
}

async fn advance_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    callback_id: Uuid,
    event: &CallbackEvent,
) -> Result<CallbackResult, GatewayError> {
    let Some(located) = locate_payment(tx, event).await? else {
        tracing::warn!(
            provider_event_id = %event.provider_event_id,
            provider_txn_id = event.provider_txn_id.as_deref().unwrap_or(""),
            "no payment matches callback"
        );
        callback_repo::mark_failed(&mut **tx, callback_id).await?;
        return Ok(CallbackResult::Orphaned);
    };

    let payment = payment_repo::lock(tx, located.id)
        .await?
        .ok_or_else(|| GatewayError::Internal("located payment vanished".into()))?;

    let new_status = event
        .outcome
        .payment_status()
        .ok_or_else(|| GatewayError::Internal(format!("non-payment outcome: {}", event.outcome)))?;

    let result = if payment.status == new_status {
        if new_status.is_terminal() {
            // Same terminal reported again: treat as a merchant retry request.
            enqueue_payment_delivery(tx, &payment).await?;
            CallbackResult::Requeued(payment.id)
        } else {
            CallbackResult::Untouched(payment.id)
        }
    } else if payment.status.can_transition_to(&new_status) {
        payment_repo::apply_status(tx, payment.id, new_status, event.provider_txn_id.as_deref())
            .await?;
        let updated = payment_repo::lock(tx, payment.id)
            .await?
            .ok_or_else(|| GatewayError::Internal("payment vanished mid-transition".into()))?;
        tracing::info!(
            payment_id = %payment.id,
            old_status = %payment.status,
            new_status = %new_status,
            "payment status advanced by callback"
        );
        if new_status.is_terminal() {
            enqueue_payment_delivery(tx, &updated).await?;
        }
        CallbackResult::Processed(payment.id)
    } else {
        // Terminal states are sticky; a conflicting terminal report is logged
        // and dropped.
        tracing::warn!(
            payment_id = %payment.id,
            current = %payment.status,
            incoming = %new_status,
            "ignoring callback against terminal payment"
        );
        CallbackResult::Untouched(payment.id)
    };

    callback_repo::mark_processed(&mut **tx, callback_id, Some(payment.id)).await?;
    Ok(result)
}

async fn advance_refund(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    callback_id: Uuid,
    event: &CallbackEvent,
) -> Result<CallbackResult, GatewayError> {
    let located = match &event.provider_refund_id {
        Some(refund_id) => {
            refund_repo::find_by_provider_refund_id(&mut **tx, event.provider, refund_id).await?
        }
        None => None,
    };
    let Some(located) = located else {
        tracing::warn!(
            provider_event_id = %event.provider_event_id,
            provider_refund_id = event.provider_refund_id.as_deref().unwrap_or(""),
            "no refund matches callback"
        );
        callback_repo::mark_failed(&mut **tx, callback_id).await?;
        return Ok(CallbackResult::Orphaned);
    };

    let refund = refund_repo::lock(tx, located.id)
        .await?
        .ok_or_else(|| GatewayError::Internal("located refund vanished".into()))?;

    let new_status = event
        .outcome
        .refund_status()
        .ok_or_else(|| GatewayError::Internal(format!("non-refund outcome: {}", event.outcome)))?;

    let result = if refund.status == new_status {
        // Refund deliveries fire for any mapped status; re-arm on replay.
        enqueue_refund_delivery(tx, &refund).await?;
        CallbackResult::Requeued(refund.id)
    } else if !refund.status.is_terminal() {
        refund_repo::apply_status(tx, refund.id, new_status).await?;
        let updated = refund_repo::lock(tx, refund.id)
            .await?
            .ok_or_else(|| GatewayError::Internal("refund vanished mid-transition".into()))?;
        tracing::info!(
            refund_id = %refund.id,
            old_status = %refund.status,
            new_status = %new_status,
            "refund status advanced by callback"
        );
        enqueue_refund_delivery(tx, &updated).await?;
        CallbackResult::Processed(refund.id)
    } else {
        tracing::warn!(
            refund_id = %refund.id,
            current = %refund.status,
            incoming = %new_status,
            "ignoring callback against terminal refund"
        );
        CallbackResult::Untouched(refund.id)
    };

    callback_repo::mark_processed(&mut **tx, callback_id, Some(refund.payment_id)).await?;
    Ok(result)
}

/// Resolve the merchant notify URL (payment override, then app default) and
/// upsert the delivery. An unresolvable URL drops the delivery with a log.
async fn enqueue_payment_delivery(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment: &Payment,
) -> Result<(), GatewayError> {
    let Some(base) = resolve_notify_url(tx, payment).await? else {
        return Ok(());
    };
    delivery_repo::upsert(&mut **tx, &NewDelivery::for_payment(payment, &base)).await
}

async fn enqueue_refund_delivery(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    refund: &Refund,
) -> Result<(), GatewayError> {
    let payment = payment_repo::get(&mut **tx, refund.payment_id)
        .await?
        .ok_or_else(|| GatewayError::Internal("refund without parent payment".into()))?;
    let Some(base) = resolve_notify_url(tx, &payment).await? else {
        return Ok(());
    };
    delivery_repo::upsert(&mut **tx, &NewDelivery::for_refund(&payment, refund, &base)).await
}

async fn resolve_notify_url(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment: &Payment,
) -> Result<Option<String>, GatewayError> {
    let url = match &payment.notify_url {
        Some(url) => Some(url.clone()),
        None => app_repo::notify_url_of(&mut **tx, payment.app_id).await?,
    };
    if url.is_none() {
        tracing::warn!(
            payment_id = %payment.id,
            app_id = %payment.app_id,
            "no notify_url resolvable, dropping outbound delivery"
        );
    }
    Ok(url)
}
