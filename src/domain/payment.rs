use {
    super::error::GatewayError,
    super::money::{Amount, Currency},
    super::provider::Provider,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Terminal states are sticky: no edge leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Exhaustive transition table. Every allowed edge is listed explicitly.
    /// If it's not here, it's not allowed.
    ///
    /// Pending → Succeeded | Failed | Canceled
    pub fn can_transition_to(&self, new: &Self) -> bool {
        matches!(
            (self, new),
            (Self::Pending, Self::Succeeded)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Canceled)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(GatewayError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Stored payment row, fully typed.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub app_id: Uuid,
    pub merchant_order_no: String,
    pub provider: Provider,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub provider_txn_id: Option<String>,
    pub notify_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for creating a payment order.
#[derive(Debug, Clone)]
pub struct PaymentDraft {
    pub merchant_order_no: String,
    pub provider: Provider,
    pub unit_amount: i64,
    pub quantity: i64,
    pub currency: Currency,
    pub notify_url: Option<String>,
    pub expire_minutes: Option<i64>,
    pub product_name: Option<String>,
    pub product_desc: Option<String>,
}

impl PaymentDraft {
    pub fn total_amount(&self) -> Result<Amount, GatewayError> {
        Amount::from_unit(self.unit_amount, self.quantity)
    }
}

/// For INSERT — id auto-generated via Uuid::now_v7(), status starts pending.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub app_id: Uuid,
    pub merchant_order_no: String,
    pub provider: Provider,
    pub amount: Amount,
    pub currency: Currency,
    pub notify_url: Option<String>,
}

impl NewPayment {
    pub fn new(
        app_id: Uuid,
        draft: &PaymentDraft,
        notify_url: Option<String>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            id: Uuid::now_v7(),
            app_id,
            merchant_order_no: draft.merchant_order_no.clone(),
            provider: draft.provider,
            amount: draft.total_amount()?,
            currency: draft.currency,
            notify_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_transition_valid_paths() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(&Succeeded));
        assert!(Pending.can_transition_to(&Failed));
        assert!(Pending.can_transition_to(&Canceled));
    }

    #[test]
    fn can_transition_invalid_paths() {
        use PaymentStatus::*;
        // same status
        assert!(!Pending.can_transition_to(&Pending));
        assert!(!Succeeded.can_transition_to(&Succeeded));
        // out of a terminal
        assert!(!Succeeded.can_transition_to(&Pending));
        assert!(!Failed.can_transition_to(&Pending));
        assert!(!Canceled.can_transition_to(&Pending));
        assert!(!Failed.can_transition_to(&Succeeded));
        assert!(!Canceled.can_transition_to(&Succeeded));
        assert!(!Succeeded.can_transition_to(&Failed));
    }

    #[test]
    fn terminal_set() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Succeeded.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Canceled.is_terminal());
    }

    #[test]
    fn status_as_str_roundtrip() {
        let statuses = [
            PaymentStatus::Pending,
            PaymentStatus::Succeeded,
            PaymentStatus::Failed,
            PaymentStatus::Canceled,
        ];
        for s in &statuses {
            let parsed = PaymentStatus::try_from(s.as_str()).unwrap();
            assert_eq!(&parsed, s);
        }
    }

    #[test]
    fn status_try_from_unknown_is_err() {
        assert!(PaymentStatus::try_from("expired").is_err());
    }

    #[test]
    fn draft_total_amount() {
        let draft = PaymentDraft {
            merchant_order_no: "ord-1".into(),
            provider: Provider::Stripe,
            unit_amount: 1000,
            quantity: 2,
            currency: Currency::Usd,
            notify_url: None,
            expire_minutes: None,
            product_name: None,
            product_desc: None,
        };
        assert_eq!(draft.total_amount().unwrap().minor_units(), 2000);
    }
}
