use {
    super::errors::ApiError,
    crate::AppState,
    crate::domain::app::App,
    crate::domain::error::GatewayError,
    crate::infra::postgres::app_repo,
    axum::{extract::FromRequestParts, http::request::Parts},
};

/// `X-API-Key` authenticated merchant app, resolved per request.
pub struct ApiApp(pub App);

impl FromRequestParts<AppState> for ApiApp {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| GatewayError::Unauthorized("missing X-API-Key header".into()))?;

        let app = app_repo::find_by_api_key(&state.pool, api_key)
            .await?
            .ok_or_else(|| GatewayError::Unauthorized("invalid API key".into()))?;

        if !app.is_active {
            return Err(GatewayError::Forbidden("app is disabled".into()).into());
        }

        Ok(Self(app))
    }
}
