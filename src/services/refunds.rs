use {
    crate::adapters::ProviderRegistry,
    crate::domain::error::GatewayError,
    crate::domain::money::Amount,
    crate::domain::payment::PaymentStatus,
    crate::domain::refund::{NewRefund, Refund, RefundStatus},
    crate::infra::postgres::{payment_repo, refund_repo},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct RefundDraft {
    pub payment_id: Uuid,
    /// None means full refund.
    pub refund_amount: Option<i64>,
    pub reason: Option<String>,
}

/// Create a refund against a succeeded payment.
///
/// The cumulative cap (Σ pending+succeeded refunds ≤ payment amount) is
/// checked with the parent payment row locked, so two concurrent refunds
/// cannot jointly overshoot it.
pub async fn create_refund(
    pool: &PgPool,
    registry: &ProviderRegistry,
    draft: &RefundDraft,
) -> Result<Refund, GatewayError> {
    let mut tx = pool.begin().await?;

    let payment = payment_repo::lock(&mut tx, draft.payment_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("payment not found: {}", draft.payment_id)))?;

    if payment.status != PaymentStatus::Succeeded {
        return Err(GatewayError::BadRequest(format!(
            "payment must be succeeded to refund, current status: {}",
            payment.status
        )));
    }

    let refund_amount = match draft.refund_amount {
        None => payment.amount,
        Some(amount) => {
            let amount = Amount::new(amount)?;
            if amount > payment.amount {
                return Err(GatewayError::BadRequest(format!(
                    "refund amount {} exceeds payment amount {}",
                    amount, payment.amount
                )));
            }
            amount
        }
    };

    let already_held = refund_repo::sum_holding(&mut *tx, payment.id).await?;
    if already_held + refund_amount.minor_units() > payment.amount.minor_units() {
        return Err(GatewayError::BadRequest(format!(
            "cumulative refunds {} would exceed payment amount {}",
            already_held + refund_amount.minor_units(),
            payment.amount
        )));
    }

    let txn_id = payment.provider_txn_id.as_deref().ok_or_else(|| {
        GatewayError::BadRequest("payment has no provider transaction id".into())
    })?;

    let adapter = registry.get(payment.provider)?;
    let provider_refund = adapter
        .create_refund(txn_id, Some(refund_amount), draft.reason.as_deref())
        .await?;

    let refund = NewRefund::new(
        payment.id,
        refund_amount,
        draft.reason.clone(),
        RefundStatus::from(provider_refund.status),
        payment.provider,
        Some(provider_refund.provider_refund_id.clone()),
        Some(provider_refund.raw.clone()),
    );

    refund_repo::insert(&mut *tx, &refund).await?;
    tx.commit().await?;

    tracing::info!(
        refund_id = %refund.id,
        payment_id = %payment.id,
        amount = refund.refund_amount.minor_units(),
        status = %refund.status,
        "refund created"
    );

    refund_repo::get(pool, refund.id)
        .await?
        .ok_or_else(|| GatewayError::Internal("inserted refund vanished".into()))
}

pub async fn get_refund(pool: &PgPool, refund_id: Uuid) -> Result<Refund, GatewayError> {
    refund_repo::get(pool, refund_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("refund not found: {refund_id}")))
}

pub async fn list_refunds_by_payment(
    pool: &PgPool,
    payment_id: Uuid,
    offset: i64,
    limit: i64,
) -> Result<(Vec<Refund>, i64), GatewayError> {
    refund_repo::list_by_payment(pool, payment_id, offset, limit.clamp(1, 100)).await
}

/// Pull the provider-side refund state and converge the local row. A refund
/// already in a terminal state is returned unchanged.
pub async fn sync_refund_status(
    pool: &PgPool,
    registry: &ProviderRegistry,
    refund_id: Uuid,
) -> Result<Refund, GatewayError> {
    let refund = get_refund(pool, refund_id).await?;

    if refund.status.is_terminal() {
        tracing::info!(refund_id = %refund.id, status = %refund.status, "refund already final");
        return Ok(refund);
    }

    let provider_refund_id = refund.provider_refund_id.as_deref().ok_or_else(|| {
        GatewayError::BadRequest("refund has no provider refund id".into())
    })?;

    let adapter = registry.get(refund.provider)?;
    let provider_refund = adapter.get_refund(provider_refund_id).await?;
    let new_status = RefundStatus::from(provider_refund.status);

    if new_status == refund.status {
        tracing::info!(refund_id = %refund.id, status = %refund.status, "refund status unchanged");
        return Ok(refund);
    }

    let mut tx = pool.begin().await?;
    let locked = refund_repo::lock(&mut tx, refund.id)
        .await?
        .ok_or_else(|| GatewayError::Internal("refund vanished".into()))?;

    // Re-check under the lock: a concurrent callback may have won.
    if locked.status.is_terminal() {
        tx.commit().await?;
        return Ok(locked);
    }

    refund_repo::apply_status(&mut tx, refund.id, new_status).await?;
    tx.commit().await?;

    tracing::info!(
        refund_id = %refund.id,
        old_status = %refund.status,
        new_status = %new_status,
        "refund status synced from provider"
    );
    get_refund(pool, refund.id).await
}
