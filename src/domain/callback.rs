use {
    super::error::GatewayError,
    super::payment::PaymentStatus,
    super::provider::Provider,
    super::refund::RefundStatus,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Canonical outcome vocabulary. Adapters collapse provider-specific event
/// names into this set and reject anything they cannot map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Succeeded,
    Failed,
    Canceled,
    Expired,
    Pending,
    RefundSucceeded,
    RefundFailed,
    RefundPending,
    RefundCanceled,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Pending => "pending",
            Self::RefundSucceeded => "refund_succeeded",
            Self::RefundFailed => "refund_failed",
            Self::RefundPending => "refund_pending",
            Self::RefundCanceled => "refund_canceled",
        }
    }

    pub fn is_refund(&self) -> bool {
        matches!(
            self,
            Self::RefundSucceeded | Self::RefundFailed | Self::RefundPending | Self::RefundCanceled
        )
    }

    /// Outcome → payment status. Expired is collapsed to canceled: the order
    /// was closed without completing.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Succeeded => Some(PaymentStatus::Succeeded),
            Self::Failed => Some(PaymentStatus::Failed),
            Self::Canceled | Self::Expired => Some(PaymentStatus::Canceled),
            Self::Pending => Some(PaymentStatus::Pending),
            _ => None,
        }
    }

    pub fn refund_status(&self) -> Option<RefundStatus> {
        match self {
            Self::RefundSucceeded => Some(RefundStatus::Succeeded),
            Self::RefundFailed => Some(RefundStatus::Failed),
            Self::RefundPending => Some(RefundStatus::Pending),
            Self::RefundCanceled => Some(RefundStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for CallbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CallbackOutcome {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            "pending" => Ok(Self::Pending),
            "refund_succeeded" => Ok(Self::RefundSucceeded),
            "refund_failed" => Ok(Self::RefundFailed),
            "refund_pending" => Ok(Self::RefundPending),
            "refund_canceled" => Ok(Self::RefundCanceled),
            other => Err(GatewayError::Validation(format!(
                "unknown callback outcome: {other}"
            ))),
        }
    }
}

/// Canonical inbound event, produced by an adapter after signature
/// verification. `provider_refund_id` is set only for `refund_*` outcomes.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub provider: Provider,
    pub provider_event_id: String,
    pub provider_txn_id: Option<String>,
    pub merchant_order_no: Option<String>,
    pub provider_refund_id: Option<String>,
    pub outcome: CallbackOutcome,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

impl CallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for CallbackStatus {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "received" => Ok(Self::Received),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(GatewayError::Validation(format!(
                "unknown callback status: {other}"
            ))),
        }
    }
}
