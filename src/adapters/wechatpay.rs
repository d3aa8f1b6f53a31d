use {
    crate::config::WechatPaySettings,
    crate::domain::callback::{CallbackEvent, CallbackOutcome},
    crate::domain::error::GatewayError,
    crate::domain::money::Amount,
    crate::domain::provider::{
        CancelOutcome, CreateProviderPayment, PayType, Provider, ProviderAdapter,
        ProviderPaymentResult, ProviderRefund, ProviderRefundStatus,
    },
    aes_gcm::aead::{Aead, Payload},
    aes_gcm::{Aes256Gcm, KeyInit, Nonce},
    async_trait::async_trait,
    base64::Engine as _,
    chrono::Utc,
    rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey},
    rsa::pkcs8::{DecodePrivateKey, DecodePublicKey},
    rsa::signature::{SignatureEncoding, Signer, Verifier},
    rsa::{RsaPrivateKey, RsaPublicKey},
    sha2::Sha256,
    std::collections::HashMap,
    std::time::Duration,
    uuid::Uuid,
};

const API_BASE: &str = "https://api.mch.weixin.qq.com";

/// WeChat Pay Native adapter (APIv3). Requests carry a
/// `WECHATPAY2-SHA256-RSA2048` signature made with the merchant private key;
/// callbacks are verified against the platform public key and their
/// `resource` decrypted with AES-256-GCM under the APIv3 key.
pub struct WechatPayAdapter {
    mchid: String,
    appid: String,
    api_v3_key: String,
    serial_no: String,
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    client: reqwest::Client,
}

impl WechatPayAdapter {
    pub fn new(settings: &WechatPaySettings) -> Result<Self, GatewayError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(&settings.private_key)
            .map_err(|e| GatewayError::Validation(format!("invalid wechatpay private key: {e}")))?;
        let public_key = RsaPublicKey::from_public_key_pem(&settings.platform_public_key)
            .map_err(|e| GatewayError::Validation(format!("invalid wechatpay public key: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            mchid: settings.mchid.clone(),
            appid: settings.appid.clone(),
            api_v3_key: settings.api_v3_key.clone(),
            serial_no: settings.serial_no.clone(),
            signing_key: SigningKey::new(private_key),
            verifying_key: VerifyingKey::new(public_key),
            client,
        })
    }

    /// `Authorization` header per APIv3: RSA-SHA256 over
    /// `method\npath\ntimestamp\nnonce\nbody\n`.
    fn auth_header(&self, method: &str, url_path: &str, body: &str) -> String {
        let timestamp = Utc::now().timestamp();
        let nonce = Uuid::new_v4().simple().to_string();
        let message = format!("{method}\n{url_path}\n{timestamp}\n{nonce}\n{body}\n");
        let signature = self.signing_key.sign(message.as_bytes());
        let signature = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        format!(
            "WECHATPAY2-SHA256-RSA2048 mchid=\"{}\",nonce_str=\"{}\",signature=\"{}\",timestamp=\"{}\",serial_no=\"{}\"",
            self.mchid, nonce, signature, timestamp, self.serial_no
        )
    }

    async fn post_json(
        &self,
        url_path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, GatewayError> {
        let body_str = body.to_string();
        self.client
            .post(format!("{API_BASE}{url_path}"))
            .header("Authorization", self.auth_header("POST", url_path, &body_str))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body_str)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("wechatpay request: {e}")))
    }

    async fn get_json(&self, url_path: &str) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .client
            .get(format!("{API_BASE}{url_path}"))
            .header("Authorization", self.auth_header("GET", url_path, ""))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("wechatpay request: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "wechatpay HTTP {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("wechatpay response: {e}")))
    }

    /// Verify `Wechatpay-Signature` over `timestamp\nnonce\nbody\n`.
    fn verify_callback_signature(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<(), GatewayError> {
        let timestamp = headers
            .get("wechatpay-timestamp")
            .ok_or_else(|| GatewayError::Signature("missing Wechatpay-Timestamp".into()))?;
        let nonce = headers
            .get("wechatpay-nonce")
            .ok_or_else(|| GatewayError::Signature("missing Wechatpay-Nonce".into()))?;
        let signature = headers
            .get("wechatpay-signature")
            .ok_or_else(|| GatewayError::Signature("missing Wechatpay-Signature".into()))?;

        let body_str = std::str::from_utf8(body)
            .map_err(|e| GatewayError::Signature(format!("non-utf8 callback body: {e}")))?;
        let message = format!("{timestamp}\n{nonce}\n{body_str}\n");

        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(signature)
            .map_err(|e| GatewayError::Signature(format!("wechatpay sign not base64: {e}")))?;
        let signature = Signature::try_from(sig_bytes.as_slice())
            .map_err(|e| GatewayError::Signature(format!("wechatpay sign malformed: {e}")))?;
        self.verifying_key
            .verify(message.as_bytes(), &signature)
            .map_err(|e| GatewayError::Signature(format!("wechatpay signature mismatch: {e}")))
    }

    /// AES-256-GCM decryption of the callback `resource` block.
    fn decrypt_resource(
        &self,
        resource: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let ciphertext = resource
            .get("ciphertext")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Validation("resource missing ciphertext".into()))?;
        let nonce = resource
            .get("nonce")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Validation("resource missing nonce".into()))?;
        let aad = resource
            .get("associated_data")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|e| GatewayError::Validation(format!("ciphertext not base64: {e}")))?;
        if nonce.len() != 12 {
            return Err(GatewayError::Validation(format!(
                "resource nonce must be 12 bytes, got {}",
                nonce.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(self.api_v3_key.as_bytes())
            .map_err(|_| GatewayError::Validation("api_v3_key must be 32 bytes".into()))?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: &ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| GatewayError::Signature("resource decryption failed".into()))?;

        serde_json::from_slice(&plaintext).map_err(GatewayError::from)
    }
}

fn map_refund_status(status: &str) -> ProviderRefundStatus {
    match status {
        "SUCCESS" => ProviderRefundStatus::Succeeded,
        "PROCESSING" => ProviderRefundStatus::Pending,
        "CLOSED" => ProviderRefundStatus::Canceled,
        _ => ProviderRefundStatus::Failed,
    }
}

fn map_trade_state(trade_state: &str) -> Result<CallbackOutcome, GatewayError> {
    match trade_state {
        "SUCCESS" => Ok(CallbackOutcome::Succeeded),
        "PAYERROR" => Ok(CallbackOutcome::Failed),
        "CLOSED" | "REVOKED" => Ok(CallbackOutcome::Canceled),
        "NOTPAY" | "USERPAYING" => Ok(CallbackOutcome::Pending),
        other => Err(GatewayError::UnsupportedEvent(format!(
            "unhandled wechatpay trade_state: {other}"
        ))),
    }
}

#[async_trait]
impl ProviderAdapter for WechatPayAdapter {
    fn provider(&self) -> Provider {
        Provider::Wechatpay
    }

    /// Native order: the response `code_url` is rendered as a QR code for the
    /// buyer to scan.
    async fn create_payment(
        &self,
        req: &CreateProviderPayment,
    ) -> Result<ProviderPaymentResult, GatewayError> {
        let description = req
            .product_name
            .as_deref()
            .or(req.product_desc.as_deref())
            .unwrap_or("item");

        let mut body = serde_json::json!({
            "appid": self.appid,
            "mchid": self.mchid,
            "description": description,
            "out_trade_no": req.merchant_order_no,
            "notify_url": req.notify_url,
            "amount": {
                "total": req.total_amount(),
                "currency": req.currency.as_str(),
            },
        });
        if let Some(minutes) = req.expire_minutes {
            let expire_at = Utc::now() + chrono::Duration::minutes(minutes);
            body["time_expire"] =
                serde_json::Value::String(expire_at.format("%Y-%m-%dT%H:%M:%S+00:00").to_string());
        }

        let response = self.post_json("/v3/pay/transactions/native", &body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "wechatpay create order HTTP {status}: {text}"
            )));
        }
        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("wechatpay response: {e}")))?;

        let code_url = result
            .get("code_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Provider("wechatpay did not return code_url".into()))?;

        tracing::info!(
            merchant_order_no = %req.merchant_order_no,
            "wechatpay native order created"
        );

        Ok(ProviderPaymentResult {
            pay_type: PayType::Qr,
            payload: serde_json::json!({ "code_url": code_url }),
            // The transaction id only materializes with the payment callback.
            provider_txn_id: None,
        })
    }

    /// Close an unpaid order. WeChat answers 204 on success; an order in a
    /// non-closable state is reported back, not raised.
    async fn cancel_payment(
        &self,
        merchant_order_no: &str,
        _provider_txn_id: Option<&str>,
    ) -> Result<CancelOutcome, GatewayError> {
        if merchant_order_no.is_empty() {
            return Err(GatewayError::BadRequest(
                "wechatpay close requires merchant_order_no".into(),
            ));
        }

        let url_path = format!("/v3/pay/transactions/out-trade-no/{merchant_order_no}/close");
        let body = serde_json::json!({ "mchid": self.mchid });
        let response = self.post_json(&url_path, &body).await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(CancelOutcome {
                success: true,
                provider_txn_id: None,
                message: None,
            });
        }

        let result: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(CancelOutcome {
            success: false,
            provider_txn_id: None,
            message: result
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    /// Domestic refund. WeChat needs the original order total, so the
    /// transaction is fetched first; the refund is keyed by our generated
    /// `out_refund_no`, which doubles as the provider refund id for queries
    /// and callbacks.
    async fn create_refund(
        &self,
        txn_id: &str,
        refund_amount: Option<Amount>,
        reason: Option<&str>,
    ) -> Result<ProviderRefund, GatewayError> {
        let txn = self
            .get_json(&format!(
                "/v3/pay/transactions/id/{txn_id}?mchid={}",
                self.mchid
            ))
            .await?;
        let total = txn
            .get("amount")
            .and_then(|a| a.get("total"))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| GatewayError::Provider("wechatpay transaction missing amount".into()))?;
        let refund = refund_amount.map(|a| a.minor_units()).unwrap_or(total);

        let out_refund_no = Uuid::now_v7().simple().to_string();
        let mut body = serde_json::json!({
            "transaction_id": txn_id,
            "out_refund_no": out_refund_no,
            "amount": {
                "refund": refund,
                "total": total,
                "currency": "CNY",
            },
        });
        if let Some(reason) = reason {
            body["reason"] = serde_json::Value::String(reason.to_string());
        }

        let response = self.post_json("/v3/refund/domestic/refunds", &body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "wechatpay refund HTTP {status}: {text}"
            )));
        }
        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("wechatpay response: {e}")))?;

        let status = result
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("PROCESSING");

        tracing::info!(out_refund_no = %out_refund_no, status, "wechatpay refund requested");

        Ok(ProviderRefund {
            provider_refund_id: out_refund_no,
            status: map_refund_status(status),
            amount: Amount::new(refund).ok(),
            currency: None,
            raw: result,
        })
    }

    async fn get_refund(&self, provider_refund_id: &str) -> Result<ProviderRefund, GatewayError> {
        let result = self
            .get_json(&format!("/v3/refund/domestic/refunds/{provider_refund_id}"))
            .await?;

        let status = result
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("PROCESSING");
        let amount = result
            .get("amount")
            .and_then(|a| a.get("refund"))
            .and_then(|v| v.as_i64())
            .and_then(|v| Amount::new(v).ok());

        Ok(ProviderRefund {
            provider_refund_id: provider_refund_id.to_string(),
            status: map_refund_status(status),
            amount,
            currency: None,
            raw: result,
        })
    }

    /// Verify on the raw bytes, then decrypt the resource before reading any
    /// business field out of it.
    async fn parse_and_verify_callback(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<CallbackEvent, GatewayError> {
        self.verify_callback_signature(headers, body)?;

        let raw_payload: serde_json::Value = serde_json::from_slice(body)?;
        let provider_event_id = raw_payload
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Validation("missing wechatpay event id".into()))?
            .to_string();
        let event_type = raw_payload
            .get("event_type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let resource = raw_payload
            .get("resource")
            .ok_or_else(|| GatewayError::Validation("missing wechatpay resource".into()))?;
        let decrypted = self.decrypt_resource(resource)?;

        if let Some(refund_outcome) = match event_type.as_str() {
            "REFUND.SUCCESS" => Some(CallbackOutcome::RefundSucceeded),
            "REFUND.ABNORMAL" => Some(CallbackOutcome::RefundFailed),
            "REFUND.CLOSED" => Some(CallbackOutcome::RefundCanceled),
            _ => None,
        } {
            return Ok(CallbackEvent {
                provider: Provider::Wechatpay,
                provider_event_id,
                provider_txn_id: decrypted
                    .get("transaction_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                merchant_order_no: decrypted
                    .get("out_trade_no")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                provider_refund_id: decrypted
                    .get("out_refund_no")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                outcome: refund_outcome,
                raw_payload,
            });
        }

        if !event_type.starts_with("TRANSACTION.") {
            return Err(GatewayError::UnsupportedEvent(format!(
                "unhandled wechatpay event_type: {event_type}"
            )));
        }

        let trade_state = decrypted
            .get("trade_state")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(CallbackEvent {
            provider: Provider::Wechatpay,
            provider_event_id,
            provider_txn_id: decrypted
                .get("transaction_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            merchant_order_no: decrypted
                .get("out_trade_no")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            provider_refund_id: None,
            outcome: map_trade_state(trade_state)?,
            raw_payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_state_table() {
        assert_eq!(
            map_trade_state("SUCCESS").unwrap(),
            CallbackOutcome::Succeeded
        );
        assert_eq!(
            map_trade_state("PAYERROR").unwrap(),
            CallbackOutcome::Failed
        );
        assert_eq!(
            map_trade_state("CLOSED").unwrap(),
            CallbackOutcome::Canceled
        );
        assert_eq!(
            map_trade_state("REVOKED").unwrap(),
            CallbackOutcome::Canceled
        );
        assert_eq!(map_trade_state("NOTPAY").unwrap(), CallbackOutcome::Pending);
        assert!(map_trade_state("UNKNOWN_STATE").is_err());
    }

    #[test]
    fn refund_status_table() {
        assert_eq!(map_refund_status("SUCCESS"), ProviderRefundStatus::Succeeded);
        assert_eq!(
            map_refund_status("PROCESSING"),
            ProviderRefundStatus::Pending
        );
        assert_eq!(map_refund_status("CLOSED"), ProviderRefundStatus::Canceled);
        assert_eq!(map_refund_status("ABNORMAL"), ProviderRefundStatus::Failed);
    }
}
