use {
    super::error::GatewayError,
    super::payment::Payment,
    super::refund::Refund,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    std::time::Duration,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Dead,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for DeliveryStatus {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(GatewayError::Validation(format!(
                "unknown delivery status: {other}"
            ))),
        }
    }
}

/// Which merchant endpoint the delivery targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Payment,
    Refund,
}

impl DeliveryKind {
    /// Appended to the merchant's base notify_url.
    pub fn path_suffix(&self) -> &'static str {
        match self {
            Self::Payment => "/callback/payment",
            Self::Refund => "/callback/refund",
        }
    }

    pub fn event_type(&self, status: &str) -> String {
        match self {
            Self::Payment => format!("payment.{status}"),
            Self::Refund => format!("refund.{status}"),
        }
    }
}

/// Merchant-side idempotency key. Stable across retries of the same logical
/// transition: repeated arrivals at the same terminal state re-queue the same
/// row instead of creating a new one.
pub fn delivery_event_id(entity_id: Uuid, status: &str) -> String {
    format!("{entity_id}_{status}")
}

/// Exponential backoff with additive jitter. `attempt_count` is the number of
/// attempts already made (including the one that just failed); `jitter_frac`
/// is uniform in [0, 1). The resulting delay is in [2^k, 1.2 * 2^k) seconds.
pub fn retry_backoff(attempt_count: i32, jitter_frac: f64) -> Duration {
    let base = 2f64.powi(attempt_count);
    Duration::from_secs_f64(base + jitter_frac * 0.2 * base)
}

/// Outbound delivery row as stored.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub app_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub event_id: String,
    pub event_type: String,
    pub notify_url: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempt_count: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_http_status: Option<i32>,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fully resolved enqueue request, ready for the upsert.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub id: Uuid,
    pub app_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub event_id: String,
    pub event_type: String,
    pub notify_url: String,
    pub payload: serde_json::Value,
}

impl NewDelivery {
    /// Outbound notification for a payment that reached `status`.
    /// `base_notify_url` is the resolved merchant URL without the path suffix.
    pub fn for_payment(payment: &Payment, base_notify_url: &str) -> Self {
        let status = payment.status.as_str();
        let event_id = delivery_event_id(payment.id, status);
        Self {
            id: Uuid::now_v7(),
            app_id: payment.app_id,
            payment_id: Some(payment.id),
            event_type: DeliveryKind::Payment.event_type(status),
            notify_url: format!(
                "{}{}",
                base_notify_url,
                DeliveryKind::Payment.path_suffix()
            ),
            payload: serde_json::json!({
                "event_id": event_id,
                "event_type": DeliveryKind::Payment.event_type(status),
                "payment_id": payment.id,
                "merchant_order_no": payment.merchant_order_no,
                "status": status,
                "amount": payment.amount.minor_units(),
                "currency": payment.currency.as_str(),
                "provider_txn_id": payment.provider_txn_id,
                "paid_at": payment.paid_at,
            }),
            event_id,
        }
    }

    /// Outbound notification for a refund transition; carries the payment
    /// fields plus the refund block.
    pub fn for_refund(payment: &Payment, refund: &Refund, base_notify_url: &str) -> Self {
        let status = refund.status.as_str();
        let event_id = delivery_event_id(refund.id, status);
        Self {
            id: Uuid::now_v7(),
            app_id: payment.app_id,
            payment_id: Some(payment.id),
            event_type: DeliveryKind::Refund.event_type(status),
            notify_url: format!("{}{}", base_notify_url, DeliveryKind::Refund.path_suffix()),
            payload: serde_json::json!({
                "event_id": event_id,
                "event_type": DeliveryKind::Refund.event_type(status),
                "payment_id": payment.id,
                "merchant_order_no": payment.merchant_order_no,
                "status": status,
                "amount": payment.amount.minor_units(),
                "currency": payment.currency.as_str(),
                "provider_txn_id": payment.provider_txn_id,
                "paid_at": payment.paid_at,
                "refund_id": refund.id,
                "refund_amount": refund.refund_amount.minor_units(),
                "provider_refund_id": refund.provider_refund_id,
                "refunded_at": refund.refunded_at,
                "reason": refund.reason,
            }),
            event_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_without_jitter_is_power_of_two() {
        assert_eq!(retry_backoff(0, 0.0), Duration::from_secs(1));
        assert_eq!(retry_backoff(1, 0.0), Duration::from_secs(2));
        assert_eq!(retry_backoff(5, 0.0), Duration::from_secs(32));
    }

    #[test]
    fn backoff_jitter_stays_within_twenty_percent() {
        let base = retry_backoff(4, 0.0);
        let jittered = retry_backoff(4, 0.999);
        assert!(jittered >= base);
        assert!(jittered < base.mul_f64(1.2) + Duration::from_millis(1));
    }

    #[test]
    fn event_id_is_stable() {
        let id = Uuid::now_v7();
        assert_eq!(
            delivery_event_id(id, "succeeded"),
            delivery_event_id(id, "succeeded")
        );
        assert_ne!(
            delivery_event_id(id, "succeeded"),
            delivery_event_id(id, "failed")
        );
    }

    #[test]
    fn kind_suffix_and_event_type() {
        assert_eq!(DeliveryKind::Payment.path_suffix(), "/callback/payment");
        assert_eq!(DeliveryKind::Refund.path_suffix(), "/callback/refund");
        assert_eq!(
            DeliveryKind::Payment.event_type("succeeded"),
            "payment.succeeded"
        );
        assert_eq!(DeliveryKind::Refund.event_type("failed"), "refund.failed");
    }
}
