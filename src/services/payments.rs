use {
    crate::adapters::ProviderRegistry,
    crate::domain::app::App,
    crate::domain::error::GatewayError,
    crate::domain::payment::{NewPayment, Payment, PaymentDraft, PaymentStatus},
    crate::domain::provider::{CancelOutcome, CreateProviderPayment, ProviderPaymentResult},
    crate::infra::postgres::payment_repo,
    sqlx::PgPool,
    std::collections::HashMap,
    uuid::Uuid,
};

/// Weak idempotency keyed on `(app_id, merchant_order_no)`: an existing row
/// with matching core parameters is returned as-is, a mismatch is a conflict.
fn check_idempotent_match(existing: &Payment, draft: &PaymentDraft) -> Result<(), GatewayError> {
    let requested = draft.total_amount()?;
    if existing.amount != requested
        || existing.currency != draft.currency
        || existing.provider != draft.provider
    {
        return Err(GatewayError::conflict(
            "merchant order number already exists with different parameters",
            serde_json::json!({
                "merchant_order_no": draft.merchant_order_no,
                "existing": {
                    "amount": existing.amount.minor_units(),
                    "currency": existing.currency.as_str(),
                    "provider": existing.provider.as_str(),
                },
                "request": {
                    "amount": requested.minor_units(),
                    "currency": draft.currency.as_str(),
                    "provider": draft.provider.as_str(),
                },
            }),
        ));
    }
    Ok(())
}

/// Create or idempotently return a payment. Returns `(payment, is_new)`.
///
/// Two concurrent first-time creates race on the unique constraint; the loser
/// re-reads and returns the winner's row.
pub async fn create_or_get(
    pool: &PgPool,
    app: &App,
    draft: &PaymentDraft,
    idempotency_key: Option<&str>,
) -> Result<(Payment, bool), GatewayError> {
    if let Some(key) = idempotency_key {
        tracing::debug!(idempotency_key = %key, "client supplied idempotency key");
    }

    if let Some(existing) = payment_repo::find_by_order(pool, app.id, &draft.merchant_order_no).await? {
        check_idempotent_match(&existing, draft)?;
        tracing::info!(payment_id = %existing.id, "idempotent hit, returning existing payment");
        return Ok((existing, false));
    }

    let notify_url = draft.notify_url.clone().or_else(|| app.notify_url.clone());
    let new_payment = NewPayment::new(app.id, draft, notify_url)?;

    match payment_repo::insert(pool, &new_payment).await {
        Ok(()) => {
            let payment = payment_repo::get(pool, new_payment.id)
                .await?
                .ok_or_else(|| GatewayError::Internal("inserted payment vanished".into()))?;
            tracing::info!(payment_id = %payment.id, "payment created");
            Ok((payment, true))
        }
        Err(e) if e.is_unique_violation(Some("uq_payments_app_merchant_order_no")) => {
            let winner = payment_repo::find_by_order(pool, app.id, &draft.merchant_order_no)
                .await?
                .ok_or_else(|| GatewayError::Internal("conflicting payment vanished".into()))?;
            check_idempotent_match(&winner, draft)?;
            tracing::info!(payment_id = %winner.id, "lost create race, returning winner");
            Ok((winner, false))
        }
        Err(e) => Err(e),
    }
}

/// Create-or-get plus the provider order. A newly inserted payment is opened
/// at the provider and the returned transaction id backfilled; an idempotent
/// replay skips the provider call.
pub async fn place_order(
    pool: &PgPool,
    registry: &ProviderRegistry,
    app: &App,
    draft: &PaymentDraft,
    idempotency_key: Option<&str>,
    default_expire_minutes: i64,
) -> Result<(Payment, bool, Option<ProviderPaymentResult>), GatewayError> {
    let (mut payment, is_new) = create_or_get(pool, app, draft, idempotency_key).await?;
    if !is_new {
        return Ok((payment, false, None));
    }

    let adapter = registry.get(draft.provider)?;
    let mut metadata = HashMap::new();
    metadata.insert(
        "merchant_order_no".to_string(),
        draft.merchant_order_no.clone(),
    );

    let result = adapter
        .create_payment(&CreateProviderPayment {
            currency: draft.currency,
            merchant_order_no: draft.merchant_order_no.clone(),
            quantity: draft.quantity,
            unit_amount: draft.unit_amount,
            notify_url: payment.notify_url.clone().unwrap_or_default(),
            expire_minutes: Some(draft.expire_minutes.unwrap_or(default_expire_minutes)),
            product_name: draft.product_name.clone(),
            product_desc: draft.product_desc.clone(),
            metadata,
        })
        .await?;

    if let Some(txn_id) = &result.provider_txn_id {
        payment_repo::set_provider_txn_id(pool, payment.id, txn_id).await?;
        payment.provider_txn_id = Some(txn_id.clone());
    }

    Ok((payment, true, Some(result)))
}

/// App-scoped fetch. A row owned by a different app is indistinguishable from
/// a missing one.
pub async fn get_by_id(pool: &PgPool, app: &App, payment_id: Uuid) -> Result<Payment, GatewayError> {
    payment_repo::find_by_id(pool, app.id, payment_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("payment not found: {payment_id}")))
}

pub async fn get_by_merchant_order_no(
    pool: &PgPool,
    app: &App,
    merchant_order_no: &str,
) -> Result<Payment, GatewayError> {
    payment_repo::find_by_order(pool, app.id, merchant_order_no)
        .await?
        .ok_or_else(|| {
            GatewayError::NotFound(format!("payment not found: {merchant_order_no}"))
        })
}

/// Advance a payment's status under a row lock. Rejected when the current
/// status is terminal or the edge is not in the transition table.
pub async fn update_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: Uuid,
    new_status: PaymentStatus,
    provider_txn_id: Option<&str>,
) -> Result<Payment, GatewayError> {
    let payment = payment_repo::lock(tx, payment_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("payment not found: {payment_id}")))?;

    if !payment.status.can_transition_to(&new_status) {
        return Err(GatewayError::BadRequest(format!(
            "invalid status transition: {} -> {}",
            payment.status, new_status
        )));
    }

    payment_repo::apply_status(tx, payment_id, new_status, provider_txn_id).await?;
    payment_repo::lock(tx, payment_id)
        .await?
        .ok_or_else(|| GatewayError::Internal("payment vanished mid-transition".into()))
}

/// Cancel a non-terminal payment at the provider, then locally. A provider
/// that reports "cannot cancel in current state" leaves the row untouched.
pub async fn cancel(
    pool: &PgPool,
    registry: &ProviderRegistry,
    app: &App,
    merchant_order_no: &str,
) -> Result<(Payment, CancelOutcome), GatewayError> {
    let payment = get_by_merchant_order_no(pool, app, merchant_order_no).await?;

    if payment.status.is_terminal() {
        return Err(GatewayError::BadRequest(format!(
            "payment is already {}, cannot cancel",
            payment.status
        )));
    }

    let adapter = registry.get(payment.provider)?;
    let outcome = adapter
        .cancel_payment(merchant_order_no, payment.provider_txn_id.as_deref())
        .await?;

    if !outcome.success {
        tracing::warn!(
            payment_id = %payment.id,
            message = outcome.message.as_deref().unwrap_or(""),
            "provider declined cancellation"
        );
        return Ok((payment, outcome));
    }

    let mut tx = pool.begin().await?;
    let updated = update_status(
        &mut tx,
        payment.id,
        PaymentStatus::Canceled,
        outcome.provider_txn_id.as_deref(),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(payment_id = %updated.id, "payment canceled");
    Ok((updated, outcome))
}
