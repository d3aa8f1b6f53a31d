use {
    crate::config::AlipaySettings,
    crate::domain::callback::{CallbackEvent, CallbackOutcome},
    crate::domain::error::GatewayError,
    crate::domain::money::Amount,
    crate::domain::provider::{
        CancelOutcome, CreateProviderPayment, PayType, Provider, ProviderAdapter,
        ProviderPaymentResult, ProviderRefund, ProviderRefundStatus,
    },
    async_trait::async_trait,
    base64::Engine as _,
    chrono::{FixedOffset, Utc},
    rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey},
    rsa::pkcs8::{DecodePrivateKey, DecodePublicKey},
    rsa::signature::{SignatureEncoding, Signer, Verifier},
    rsa::{RsaPrivateKey, RsaPublicKey},
    sha2::Sha256,
    std::collections::{BTreeMap, HashMap},
    std::fmt::Write as _,
    uuid::Uuid,
};

const PROD_GATEWAY: &str = "https://openapi.alipay.com/gateway.do";
const SANDBOX_GATEWAY: &str = "https://openapi-sandbox.dl.alipaydev.com/gateway.do";

/// Alipay page-pay adapter. Requests are RSA2 (SHA256) signed with the
/// application private key; callbacks are verified against the Alipay
/// platform public key.
pub struct AlipayAdapter {
    app_id: String,
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    gateway_url: &'static str,
    client: reqwest::Client,
}

impl AlipayAdapter {
    pub fn new(settings: &AlipaySettings) -> Result<Self, GatewayError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(&settings.private_key)
            .map_err(|e| GatewayError::Validation(format!("invalid alipay private key: {e}")))?;
        let public_key = RsaPublicKey::from_public_key_pem(&settings.public_key)
            .map_err(|e| GatewayError::Validation(format!("invalid alipay public key: {e}")))?;

        Ok(Self {
            app_id: settings.app_id.clone(),
            signing_key: SigningKey::new(private_key),
            verifying_key: VerifyingKey::new(public_key),
            gateway_url: if settings.sandbox {
                SANDBOX_GATEWAY
            } else {
                PROD_GATEWAY
            },
            client: reqwest::Client::new(),
        })
    }

    fn common_params(&self, method: &str, notify_url: &str) -> BTreeMap<String, String> {
        // Alipay expects UTC+8 timestamps.
        let beijing = FixedOffset::east_opt(8 * 3600).expect("+08:00 is a valid offset");
        let mut params = BTreeMap::new();
        params.insert("app_id".into(), self.app_id.clone());
        params.insert("method".into(), method.to_string());
        params.insert("format".into(), "JSON".into());
        params.insert("charset".into(), "utf-8".into());
        params.insert("sign_type".into(), "RSA2".into());
        params.insert(
            "timestamp".into(),
            Utc::now()
                .with_timezone(&beijing)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        );
        params.insert("version".into(), "1.0".into());
        if !notify_url.is_empty() {
            params.insert("notify_url".into(), notify_url.to_string());
        }
        params
    }

    /// RSA2 signature over the sorted `key=value&…` string, excluding `sign`
    /// and `sign_type`.
    fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let query = params
            .iter()
            .filter(|(k, _)| k.as_str() != "sign" && k.as_str() != "sign_type")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.signing_key.sign(query.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(signature.to_bytes())
    }

    fn verify(&self, params: &BTreeMap<String, String>, sign: &str) -> Result<(), GatewayError> {
        let query = params
            .iter()
            .filter(|(k, _)| k.as_str() != "sign" && k.as_str() != "sign_type")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(sign)
            .map_err(|e| GatewayError::Signature(format!("alipay sign not base64: {e}")))?;
        let signature = Signature::try_from(sig_bytes.as_slice())
            .map_err(|e| GatewayError::Signature(format!("alipay sign malformed: {e}")))?;
        self.verifying_key
            .verify(query.as_bytes(), &signature)
            .map_err(|e| GatewayError::Signature(format!("alipay signature mismatch: {e}")))
    }

    /// POST a signed API call and unwrap the `{method}_response` envelope.
    async fn execute(
        &self,
        method: &str,
        biz_content: serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut params = self.common_params(method, "");
        params.insert("biz_content".into(), biz_content.to_string());
        let sign = self.sign(&params);
        params.insert("sign".into(), sign);

        let response = self
            .client
            .post(self.gateway_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("alipay request: {e}")))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("alipay response: {e}")))?;

        let response_key = format!("{}_response", method.replace('.', "_"));
        body.get(&response_key).cloned().ok_or_else(|| {
            GatewayError::Provider(format!("alipay response missing {response_key}"))
        })
    }
}

/// Minor units → decimal yuan string, Alipay's wire format.
fn to_yuan(minor_units: i64) -> String {
    format!("{}.{:02}", minor_units / 100, minor_units % 100)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// trade_status → canonical outcome. TRADE_CLOSED is an unpaid order closed
/// by timeout, the expired case.
fn map_trade_status(trade_status: &str) -> Result<CallbackOutcome, GatewayError> {
    match trade_status {
        "TRADE_SUCCESS" | "TRADE_FINISHED" => Ok(CallbackOutcome::Succeeded),
        "TRADE_CLOSED" => Ok(CallbackOutcome::Expired),
        "WAIT_BUYER_PAY" => Ok(CallbackOutcome::Pending),
        other => Err(GatewayError::UnsupportedEvent(format!(
            "unhandled alipay trade_status: {other}"
        ))),
    }
}

#[async_trait]
impl ProviderAdapter for AlipayAdapter {
    fn provider(&self) -> Provider {
        Provider::Alipay
    }

    /// Page pay: the signed parameter set is rendered as an auto-submitting
    /// form the merchant front-end serves to the buyer. No network call here.
    async fn create_payment(
        &self,
        req: &CreateProviderPayment,
    ) -> Result<ProviderPaymentResult, GatewayError> {
        let mut biz_content = serde_json::json!({
            "out_trade_no": req.merchant_order_no,
            "product_code": "FAST_INSTANT_TRADE_PAY",
            "total_amount": to_yuan(req.total_amount()),
            "subject": req.product_name.as_deref().unwrap_or("item"),
        });
        if let Some(desc) = &req.product_desc {
            biz_content["body"] = serde_json::Value::String(desc.clone());
        }
        if let Some(minutes) = req.expire_minutes {
            biz_content["timeout_express"] = serde_json::Value::String(format!("{minutes}m"));
        }

        let mut params = self.common_params("alipay.trade.page.pay", &req.notify_url);
        params.insert("biz_content".into(), biz_content.to_string());
        let sign = self.sign(&params);
        params.insert("sign".into(), sign);

        let mut form = format!(
            "<form id=\"alipay_submit\" action=\"{}?charset=utf-8\" method=\"POST\">\n",
            self.gateway_url
        );
        for (k, v) in &params {
            let _ = writeln!(
                form,
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
                k,
                html_escape(v)
            );
        }
        form.push_str(
            "</form>\n<script>document.getElementById('alipay_submit').submit();</script>",
        );

        tracing::info!(
            merchant_order_no = %req.merchant_order_no,
            total_amount = %to_yuan(req.total_amount()),
            "alipay page-pay form generated"
        );

        Ok(ProviderPaymentResult {
            pay_type: PayType::Form,
            payload: serde_json::json!({ "html": form }),
            // Alipay assigns the trade number at payment time, not at order
            // creation; it arrives with the callback.
            provider_txn_id: None,
        })
    }

    /// alipay.trade.close. Closing an already-settled trade is reported as a
    /// non-success, not an error.
    async fn cancel_payment(
        &self,
        merchant_order_no: &str,
        provider_txn_id: Option<&str>,
    ) -> Result<CancelOutcome, GatewayError> {
        let biz_content = match provider_txn_id {
            Some(trade_no) if merchant_order_no.is_empty() => {
                serde_json::json!({ "trade_no": trade_no })
            }
            _ => serde_json::json!({ "out_trade_no": merchant_order_no }),
        };

        let response = self.execute("alipay.trade.close", biz_content).await?;
        let code = response.get("code").and_then(|v| v.as_str()).unwrap_or("");

        Ok(CancelOutcome {
            success: code == "10000",
            provider_txn_id: response
                .get("trade_no")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            message: response
                .get("sub_msg")
                .or_else(|| response.get("msg"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    /// alipay.trade.refund is synchronous: a 10000 response with fund change
    /// means the refund is done.
    async fn create_refund(
        &self,
        txn_id: &str,
        refund_amount: Option<Amount>,
        reason: Option<&str>,
    ) -> Result<ProviderRefund, GatewayError> {
        let amount = refund_amount.ok_or_else(|| {
            GatewayError::BadRequest("alipay refunds require an explicit amount".into())
        })?;
        let out_request_no = Uuid::now_v7().simple().to_string();

        let mut biz_content = serde_json::json!({
            "trade_no": txn_id,
            "refund_amount": to_yuan(amount.minor_units()),
            "out_request_no": out_request_no,
        });
        if let Some(reason) = reason {
            biz_content["refund_reason"] = serde_json::Value::String(reason.to_string());
        }

        let response = self.execute("alipay.trade.refund", biz_content).await?;
        let code = response.get("code").and_then(|v| v.as_str()).unwrap_or("");
        let fund_change = response
            .get("fund_change")
            .and_then(|v| v.as_str())
            .unwrap_or("N");

        let status = if code == "10000" && fund_change == "Y" {
            ProviderRefundStatus::Succeeded
        } else if code == "10000" {
            ProviderRefundStatus::Pending
        } else {
            ProviderRefundStatus::Failed
        };

        tracing::info!(
            out_request_no = %out_request_no,
            code,
            fund_change,
            "alipay refund requested"
        );

        Ok(ProviderRefund {
            provider_refund_id: out_request_no,
            status,
            amount: Some(amount),
            currency: None,
            raw: response,
        })
    }

    async fn get_refund(&self, _provider_refund_id: &str) -> Result<ProviderRefund, GatewayError> {
        Err(GatewayError::ServiceUnavailable(
            "alipay does not support refund status sync".into(),
        ))
    }

    /// Callback body is form-urlencoded; the RSA2 signature covers the sorted
    /// decoded parameter set (minus sign and sign_type).
    async fn parse_and_verify_callback(
        &self,
        _headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<CallbackEvent, GatewayError> {
        let params: BTreeMap<String, String> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let sign = params
            .get("sign")
            .ok_or_else(|| GatewayError::Signature("missing alipay sign".into()))?
            .clone();
        self.verify(&params, &sign)?;

        let provider_event_id = params
            .get("notify_id")
            .ok_or_else(|| GatewayError::Validation("missing alipay notify_id".into()))?
            .clone();
        let trade_status = params
            .get("trade_status")
            .map(String::as_str)
            .unwrap_or("");
        let outcome = map_trade_status(trade_status)?;

        Ok(CallbackEvent {
            provider: Provider::Alipay,
            provider_event_id,
            provider_txn_id: params.get("trade_no").cloned(),
            merchant_order_no: params.get("out_trade_no").cloned(),
            provider_refund_id: None,
            outcome,
            raw_payload: serde_json::to_value(&params)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuan_formatting() {
        assert_eq!(to_yuan(100), "1.00");
        assert_eq!(to_yuan(2050), "20.50");
        assert_eq!(to_yuan(7), "0.07");
    }

    #[test]
    fn trade_status_table() {
        assert_eq!(
            map_trade_status("TRADE_SUCCESS").unwrap(),
            CallbackOutcome::Succeeded
        );
        assert_eq!(
            map_trade_status("TRADE_FINISHED").unwrap(),
            CallbackOutcome::Succeeded
        );
        assert_eq!(
            map_trade_status("TRADE_CLOSED").unwrap(),
            CallbackOutcome::Expired
        );
        assert_eq!(
            map_trade_status("WAIT_BUYER_PAY").unwrap(),
            CallbackOutcome::Pending
        );
        assert!(map_trade_status("TRADE_BANANA").is_err());
    }

    #[test]
    fn html_escape_attribute_values() {
        assert_eq!(html_escape(r#"a"b&c<d>"#), "a&quot;b&amp;c&lt;d&gt;");
    }
}
