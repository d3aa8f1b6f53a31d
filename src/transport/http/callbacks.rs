use {
    crate::AppState,
    crate::domain::error::GatewayError,
    crate::domain::provider::Provider,
    crate::services::callbacks,
    axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    std::collections::HashMap,
};

/// What the provider expects as a "stop retrying" acknowledgement.
fn ack(provider: Provider) -> Response {
    match provider {
        Provider::Stripe => StatusCode::OK.into_response(),
        Provider::Alipay => (StatusCode::OK, "success").into_response(),
        Provider::Wechatpay => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "code": "SUCCESS", "message": "OK" })),
        )
            .into_response(),
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Shared inbound path: verify with the provider adapter, then feed the
/// canonical event into the callback service.
///
/// Signature failures answer 5xx so the provider retries; once an inbox row
/// exists, failures are ours to re-drive and the provider gets its ack.
#[tracing::instrument(name = "callback", skip_all, fields(provider = %provider))]
async fn handle_callback(
    state: &AppState,
    provider: Provider,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let adapter = match state.registry.get(provider) {
        Ok(adapter) => adapter,
        Err(e) => {
            tracing::error!(error = %e, "callback for unconfigured provider");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let event = match adapter
        .parse_and_verify_callback(&header_map(&headers), &body)
        .await
    {
        Ok(event) => event,
        Err(GatewayError::Signature(msg)) => {
            tracing::warn!(error = %msg, "callback signature rejected");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(GatewayError::UnsupportedEvent(msg)) => {
            tracing::info!(event = %msg, "ignoring unsupported provider event");
            return ack(provider);
        }
        Err(e) => {
            tracing::error!(error = %e, "callback could not be parsed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    tracing::info!(
        provider_event_id = %event.provider_event_id,
        outcome = %event.outcome,
        "callback verified"
    );

    match callbacks::process(&state.pool, &event).await {
        Ok(result) => {
            tracing::info!(?result, "callback processed");
            ack(provider)
        }
        Err(e) => {
            tracing::error!(error = %e, "callback ingestion failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn stripe_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_callback(&state, Provider::Stripe, headers, body).await
}

pub async fn alipay_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_callback(&state, Provider::Alipay, headers, body).await
}

pub async fn wechatpay_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_callback(&state, Provider::Wechatpay, headers, body).await
}
