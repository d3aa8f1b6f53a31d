use {
    super::error::GatewayError,
    super::money::Amount,
    super::provider::{Provider, ProviderRefundStatus},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Only refunds still counting against the payment cap.
    pub fn holds_funds(&self) -> bool {
        matches!(self, Self::Pending | Self::Succeeded)
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RefundStatus {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(GatewayError::Validation(format!(
                "unknown refund status: {other}"
            ))),
        }
    }
}

impl From<ProviderRefundStatus> for RefundStatus {
    fn from(status: ProviderRefundStatus) -> Self {
        match status {
            ProviderRefundStatus::Succeeded => Self::Succeeded,
            ProviderRefundStatus::Pending => Self::Pending,
            ProviderRefundStatus::Failed => Self::Failed,
            ProviderRefundStatus::Canceled => Self::Canceled,
        }
    }
}

/// Stored refund row.
#[derive(Debug, Clone)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub refund_amount: Amount,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub provider: Provider,
    pub provider_refund_id: Option<String>,
    pub extra_data: Option<serde_json::Value>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For INSERT — id auto-generated via Uuid::now_v7().
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub refund_amount: Amount,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub provider: Provider,
    pub provider_refund_id: Option<String>,
    pub extra_data: Option<serde_json::Value>,
}

impl NewRefund {
    pub fn new(
        payment_id: Uuid,
        refund_amount: Amount,
        reason: Option<String>,
        status: RefundStatus,
        provider: Provider,
        provider_refund_id: Option<String>,
        extra_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            payment_id,
            refund_amount,
            reason,
            status,
            provider,
            provider_refund_id,
            extra_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_funds_only_pending_and_succeeded() {
        assert!(RefundStatus::Pending.holds_funds());
        assert!(RefundStatus::Succeeded.holds_funds());
        assert!(!RefundStatus::Failed.holds_funds());
        assert!(!RefundStatus::Canceled.holds_funds());
    }

    #[test]
    fn terminal_set() {
        assert!(!RefundStatus::Pending.is_terminal());
        assert!(RefundStatus::Succeeded.is_terminal());
        assert!(RefundStatus::Failed.is_terminal());
        assert!(RefundStatus::Canceled.is_terminal());
    }

    #[test]
    fn status_roundtrip() {
        for s in ["pending", "succeeded", "failed", "canceled"] {
            assert_eq!(RefundStatus::try_from(s).unwrap().as_str(), s);
        }
        assert!(RefundStatus::try_from("refunded").is_err());
    }
}
