use {
    crate::config::StripeSettings,
    crate::domain::callback::{CallbackEvent, CallbackOutcome},
    crate::domain::error::GatewayError,
    crate::domain::money::{Amount, Currency},
    crate::domain::provider::{
        CancelOutcome, CreateProviderPayment, PayType, Provider, ProviderAdapter,
        ProviderPaymentResult, ProviderRefund, ProviderRefundStatus,
    },
    async_trait::async_trait,
    std::collections::HashMap,
};

pub struct StripeAdapter {
    client: stripe::Client,
    webhook_secret: String,
}

impl StripeAdapter {
    pub fn new(settings: &StripeSettings) -> Self {
        Self {
            client: stripe::Client::new(settings.secret_key.clone()),
            webhook_secret: settings.webhook_secret.clone(),
        }
    }
}

fn convert_currency(c: Currency) -> stripe::Currency {
    match c {
        Currency::Usd => stripe::Currency::USD,
        Currency::Cny => stripe::Currency::CNY,
        Currency::Hkd => stripe::Currency::HKD,
        Currency::Krw => stripe::Currency::KRW,
        Currency::Thb => stripe::Currency::THB,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
        Currency::Jpy => stripe::Currency::JPY,
        Currency::Inr => stripe::Currency::INR,
    }
}

fn convert_refund_status(status: Option<&str>) -> ProviderRefundStatus {
    match status {
        Some("succeeded") => ProviderRefundStatus::Succeeded,
        Some("failed") => ProviderRefundStatus::Failed,
        Some("canceled") => ProviderRefundStatus::Canceled,
        _ => ProviderRefundStatus::Pending,
    }
}

fn refund_from_stripe(refund: &stripe::Refund) -> Result<ProviderRefund, GatewayError> {
    Ok(ProviderRefund {
        provider_refund_id: refund.id.to_string(),
        status: convert_refund_status(refund.status.as_deref()),
        amount: Some(Amount::new(refund.amount)?),
        currency: Currency::try_from(refund.currency.to_string().to_uppercase().as_str()).ok(),
        raw: serde_json::to_value(refund)?,
    })
}

/// Stripe event type → canonical outcome. Events outside this table are
/// rejected as unsupported; the caller answers the provider without creating
/// an inbox row.
fn map_payment_outcome(event_type: &str) -> Result<CallbackOutcome, GatewayError> {
    match event_type {
        "payment_intent.succeeded" => Ok(CallbackOutcome::Succeeded),
        "payment_intent.payment_failed" => Ok(CallbackOutcome::Failed),
        "payment_intent.canceled" => Ok(CallbackOutcome::Canceled),
        "payment_intent.processing" => Ok(CallbackOutcome::Pending),
        other => Err(GatewayError::UnsupportedEvent(format!(
            "unhandled stripe event type: {other}"
        ))),
    }
}

fn expandable_pi_id(e: &stripe::Expandable<stripe::PaymentIntent>) -> String {
    match e {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(pi) => pi.id.to_string(),
    }
}

#[async_trait]
impl ProviderAdapter for StripeAdapter {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    /// Create a PaymentIntent; the merchant completes it client-side with the
    /// returned client_secret.
    async fn create_payment(
        &self,
        req: &CreateProviderPayment,
    ) -> Result<ProviderPaymentResult, GatewayError> {
        let mut params =
            stripe::CreatePaymentIntent::new(req.total_amount(), convert_currency(req.currency));

        let description = req
            .product_name
            .clone()
            .or_else(|| req.product_desc.clone());
        params.description = description.as_deref();

        let mut metadata: HashMap<String, String> = req.metadata.clone();
        metadata.insert(
            "merchant_order_no".to_string(),
            req.merchant_order_no.clone(),
        );
        params.metadata = Some(metadata);

        let pi = stripe::PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| GatewayError::Provider(format!("stripe create payment: {e}")))?;

        tracing::info!(
            provider_txn_id = %pi.id,
            merchant_order_no = %req.merchant_order_no,
            "stripe payment intent created"
        );

        Ok(ProviderPaymentResult {
            pay_type: PayType::ClientSecret,
            payload: serde_json::json!({ "client_secret": pi.client_secret }),
            provider_txn_id: Some(pi.id.to_string()),
        })
    }

    /// Cancel a PaymentIntent. Stripe rejects cancellation of settled intents
    /// with an invalid-request error, which is reported, not thrown.
    async fn cancel_payment(
        &self,
        _merchant_order_no: &str,
        provider_txn_id: Option<&str>,
    ) -> Result<CancelOutcome, GatewayError> {
        let txn_id = provider_txn_id.ok_or_else(|| {
            GatewayError::BadRequest("stripe cancellation requires a provider_txn_id".into())
        })?;
        let pi_id = txn_id
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| GatewayError::Provider(format!("invalid PaymentIntent id: {e}")))?;

        let params = stripe::CancelPaymentIntent {
            cancellation_reason: Some(stripe::PaymentIntentCancellationReason::RequestedByCustomer),
            ..Default::default()
        };

        match stripe::PaymentIntent::cancel(&self.client, &pi_id, params).await {
            Ok(pi) => Ok(CancelOutcome {
                success: true,
                provider_txn_id: Some(pi.id.to_string()),
                message: None,
            }),
            Err(stripe::StripeError::Stripe(request_error)) => Ok(CancelOutcome {
                success: false,
                provider_txn_id: Some(txn_id.to_string()),
                message: Some(format!(
                    "cannot cancel in current state: {}",
                    request_error.message.unwrap_or_default()
                )),
            }),
            Err(e) => Err(GatewayError::Provider(format!("stripe cancel payment: {e}"))),
        }
    }

    async fn create_refund(
        &self,
        txn_id: &str,
        refund_amount: Option<Amount>,
        reason: Option<&str>,
    ) -> Result<ProviderRefund, GatewayError> {
        let pi_id = txn_id
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| GatewayError::Provider(format!("invalid PaymentIntent id: {e}")))?;

        let mut params = stripe::CreateRefund::new();
        params.payment_intent = Some(pi_id);
        params.amount = refund_amount.map(|a| a.minor_units());
        // Free-form merchant reasons collapse to requested_by_customer.
        params.reason = reason.map(|r| match r {
            "duplicate" => stripe::RefundReasonFilter::Duplicate,
            "fraudulent" => stripe::RefundReasonFilter::Fraudulent,
            _ => stripe::RefundReasonFilter::RequestedByCustomer,
        });

        let refund = stripe::Refund::create(&self.client, params)
            .await
            .map_err(|e| GatewayError::Provider(format!("stripe create refund: {e}")))?;

        tracing::info!(
            provider_refund_id = %refund.id,
            status = refund.status.as_deref().unwrap_or(""),
            "stripe refund created"
        );
        refund_from_stripe(&refund)
    }

    async fn get_refund(&self, provider_refund_id: &str) -> Result<ProviderRefund, GatewayError> {
        let refund_id = provider_refund_id
            .parse::<stripe::RefundId>()
            .map_err(|e| GatewayError::Provider(format!("invalid Refund id: {e}")))?;

        let refund = stripe::Refund::retrieve(&self.client, &refund_id, &[])
            .await
            .map_err(|e| GatewayError::Provider(format!("stripe get refund: {e}")))?;
        refund_from_stripe(&refund)
    }

    /// Verify the `Stripe-Signature` header over the raw body, then collapse
    /// the event into the canonical vocabulary.
    async fn parse_and_verify_callback(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<CallbackEvent, GatewayError> {
        let sig = headers
            .get("stripe-signature")
            .ok_or_else(|| GatewayError::Signature("missing Stripe-Signature header".into()))?;
        let payload = std::str::from_utf8(body)
            .map_err(|e| GatewayError::Signature(format!("non-utf8 webhook body: {e}")))?;

        let event = stripe::Webhook::construct_event(payload, sig, &self.webhook_secret)
            .map_err(|e| GatewayError::Signature(e.to_string()))?;

        let raw_payload: serde_json::Value = serde_json::from_str(payload)?;
        let event_type = raw_payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        match event.data.object {
            stripe::EventObject::PaymentIntent(ref pi) => Ok(CallbackEvent {
                provider: Provider::Stripe,
                provider_event_id: event.id.to_string(),
                provider_txn_id: Some(pi.id.to_string()),
                merchant_order_no: pi.metadata.get("merchant_order_no").cloned(),
                provider_refund_id: None,
                outcome: map_payment_outcome(&event_type)?,
                raw_payload,
            }),
            stripe::EventObject::Refund(ref refund) => {
                let outcome = match convert_refund_status(refund.status.as_deref()) {
                    ProviderRefundStatus::Succeeded => CallbackOutcome::RefundSucceeded,
                    ProviderRefundStatus::Failed => CallbackOutcome::RefundFailed,
                    ProviderRefundStatus::Canceled => CallbackOutcome::RefundCanceled,
                    ProviderRefundStatus::Pending => CallbackOutcome::RefundPending,
                };
                Ok(CallbackEvent {
                    provider: Provider::Stripe,
                    provider_event_id: event.id.to_string(),
                    provider_txn_id: refund.payment_intent.as_ref().map(expandable_pi_id),
                    merchant_order_no: None,
                    provider_refund_id: Some(refund.id.to_string()),
                    outcome,
                    raw_payload,
                })
            }
            _ => Err(GatewayError::UnsupportedEvent(format!(
                "unhandled stripe event object for type: {event_type}"
            ))),
        }
    }
}
