use {
    crate::domain::error::GatewayError,
    crate::domain::money::{Amount, Currency},
    crate::domain::payment::{NewPayment, Payment, PaymentStatus},
    crate::domain::provider::Provider,
    chrono::{DateTime, Utc},
    sqlx::postgres::PgExecutor,
    uuid::Uuid,
};

const COLUMNS: &str = "id, app_id, merchant_order_no, provider, amount, currency, status, \
     provider_txn_id, notify_url, paid_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PaymentRecord {
    id: Uuid,
    app_id: Uuid,
    merchant_order_no: String,
    provider: String,
    amount: i64,
    currency: String,
    status: String,
    provider_txn_id: Option<String>,
    notify_url: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    fn into_payment(self) -> Result<Payment, GatewayError> {
        Ok(Payment {
            id: self.id,
            app_id: self.app_id,
            merchant_order_no: self.merchant_order_no,
            provider: Provider::try_from(self.provider.as_str())?,
            amount: Amount::new(self.amount)?,
            currency: Currency::try_from(self.currency.as_str())?,
            status: PaymentStatus::try_from(self.status.as_str())?,
            provider_txn_id: self.provider_txn_id,
            notify_url: self.notify_url,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Insert a brand-new payment row with status `pending`. Surfaces the
/// unique-constraint violation on `(app_id, merchant_order_no)` to the caller,
/// which resolves the concurrent-create race by re-reading.
pub async fn insert(
    executor: impl PgExecutor<'_>,
    payment: &NewPayment,
) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (id, app_id, merchant_order_no, provider, amount, currency, status, notify_url)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
        "#,
    )
    .bind(payment.id)
    .bind(payment.app_id)
    .bind(&payment.merchant_order_no)
    .bind(payment.provider.as_str())
    .bind(payment.amount.minor_units())
    .bind(payment.currency.as_str())
    .bind(&payment.notify_url)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_order(
    executor: impl PgExecutor<'_>,
    app_id: Uuid,
    merchant_order_no: &str,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payments WHERE app_id = $1 AND merchant_order_no = $2"
    ))
    .bind(app_id)
    .bind(merchant_order_no)
    .fetch_optional(executor)
    .await?;
    row.map(PaymentRecord::into_payment).transpose()
}

pub async fn find_by_id(
    executor: impl PgExecutor<'_>,
    app_id: Uuid,
    payment_id: Uuid,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payments WHERE id = $1 AND app_id = $2"
    ))
    .bind(payment_id)
    .bind(app_id)
    .fetch_optional(executor)
    .await?;
    row.map(PaymentRecord::into_payment).transpose()
}

/// Unscoped lookup by id, for internal flows that already hold a reference
/// (refund creation, callback processing).
pub async fn get(
    executor: impl PgExecutor<'_>,
    payment_id: Uuid,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRecord> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM payments WHERE id = $1"))
            .bind(payment_id)
            .fetch_optional(executor)
            .await?;
    row.map(PaymentRecord::into_payment).transpose()
}

/// Callback target location, step one: by merchant order number (unscoped —
/// the provider does not know our app ids).
pub async fn find_by_order_any_app(
    executor: impl PgExecutor<'_>,
    merchant_order_no: &str,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payments WHERE merchant_order_no = $1"
    ))
    .bind(merchant_order_no)
    .fetch_optional(executor)
    .await?;
    row.map(PaymentRecord::into_payment).transpose()
}

/// Callback target location, fallback: by provider transaction id.
pub async fn find_by_provider_txn(
    executor: impl PgExecutor<'_>,
    provider: Provider,
    provider_txn_id: &str,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payments WHERE provider = $1 AND provider_txn_id = $2"
    ))
    .bind(provider.as_str())
    .bind(provider_txn_id)
    .fetch_optional(executor)
    .await?;
    row.map(PaymentRecord::into_payment).transpose()
}

/// Re-read a payment under a row lock. All state transitions go through this.
pub async fn lock(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: Uuid,
) -> Result<Option<Payment>, GatewayError> {
    let row: Option<PaymentRecord> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
    ))
    .bind(payment_id)
    .fetch_optional(&mut **tx)
    .await?;
    row.map(PaymentRecord::into_payment).transpose()
}

/// Advance the status of a locked row. Sets `paid_at` exactly when the row
/// transitions to succeeded, and backfills `provider_txn_id` if absent.
pub async fn apply_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: Uuid,
    new_status: PaymentStatus,
    provider_txn_id: Option<&str>,
) -> Result<(), GatewayError> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = $1,
            paid_at = CASE WHEN $1 = 'succeeded' THEN COALESCE(paid_at, now()) ELSE paid_at END,
            provider_txn_id = COALESCE(provider_txn_id, $2),
            updated_at = now()
        WHERE id = $3
        "#,
    )
    .bind(new_status.as_str())
    .bind(provider_txn_id)
    .bind(payment_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Record the provider transaction id returned at order creation.
pub async fn set_provider_txn_id(
    executor: impl PgExecutor<'_>,
    payment_id: Uuid,
    provider_txn_id: &str,
) -> Result<(), GatewayError> {
    sqlx::query(
        "UPDATE payments SET provider_txn_id = COALESCE(provider_txn_id, $1), updated_at = now() WHERE id = $2",
    )
    .bind(provider_txn_id)
    .bind(payment_id)
    .execute(executor)
    .await?;
    Ok(())
}
