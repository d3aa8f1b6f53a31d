use {
    super::callback::CallbackEvent,
    super::error::GatewayError,
    super::money::{Amount, Currency},
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Stripe,
    Alipay,
    Wechatpay,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Alipay => "alipay",
            Self::Wechatpay => "wechatpay",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Provider {
    type Error = GatewayError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "alipay" => Ok(Self::Alipay),
            "wechatpay" => Ok(Self::Wechatpay),
            other => Err(GatewayError::Validation(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// How the merchant front-end is expected to complete the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayType {
    Redirect,
    Form,
    Qr,
    ClientSecret,
}

impl PayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::Form => "form",
            Self::Qr => "qr",
            Self::ClientSecret => "client_secret",
        }
    }
}

/// What a provider hands back for a freshly created order.
#[derive(Debug, Clone)]
pub struct ProviderPaymentResult {
    pub pay_type: PayType,
    pub payload: serde_json::Value,
    pub provider_txn_id: Option<String>,
}

/// Cancellation is reported, never thrown: a payment that is already in a
/// non-cancelable state at the provider comes back as `success = false`.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub success: bool,
    pub provider_txn_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRefundStatus {
    Succeeded,
    Pending,
    Failed,
    Canceled,
}

/// Provider-side view of a refund (create and query share the shape).
#[derive(Debug, Clone)]
pub struct ProviderRefund {
    pub provider_refund_id: String,
    pub status: ProviderRefundStatus,
    pub amount: Option<Amount>,
    pub currency: Option<Currency>,
    pub raw: serde_json::Value,
}

/// Everything the provider needs to open an order.
#[derive(Debug, Clone)]
pub struct CreateProviderPayment {
    pub currency: Currency,
    pub merchant_order_no: String,
    pub quantity: i64,
    pub unit_amount: i64,
    pub notify_url: String,
    pub expire_minutes: Option<i64>,
    pub product_name: Option<String>,
    pub product_desc: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl CreateProviderPayment {
    pub fn total_amount(&self) -> i64 {
        self.unit_amount * self.quantity
    }
}

/// The polymorphic boundary the core consumes. One implementation per
/// provider, constructed once at startup and shared by reference.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn create_payment(
        &self,
        req: &CreateProviderPayment,
    ) -> Result<ProviderPaymentResult, GatewayError>;

    async fn cancel_payment(
        &self,
        merchant_order_no: &str,
        provider_txn_id: Option<&str>,
    ) -> Result<CancelOutcome, GatewayError>;

    /// `refund_amount = None` means full refund.
    async fn create_refund(
        &self,
        txn_id: &str,
        refund_amount: Option<Amount>,
        reason: Option<&str>,
    ) -> Result<ProviderRefund, GatewayError>;

    async fn get_refund(&self, provider_refund_id: &str) -> Result<ProviderRefund, GatewayError>;

    /// Verify the provider signature on the raw bytes, then collapse the
    /// provider event vocabulary into a canonical [`CallbackEvent`].
    async fn parse_and_verify_callback(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<CallbackEvent, GatewayError>;
}
