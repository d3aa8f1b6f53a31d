use {
    crate::domain::error::GatewayError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Serialize,
};

/// Response envelope: `code = 0` is success, anything else is the business
/// error code paired with a canonical HTTP status.
pub fn envelope<T: Serialize>(data: T, msg: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "code": 0, "msg": msg, "data": data }))
}

/// Newtype so the domain error can carry an axum `IntoResponse` impl. All
/// HTTP concerns live here, none in the services.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, msg, data) = match self.0 {
            GatewayError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 4000, msg, None),
            GatewayError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 4010, msg, None),
            GatewayError::Forbidden(msg) => (StatusCode::FORBIDDEN, 4030, msg, None),
            GatewayError::NotFound(msg) => (StatusCode::NOT_FOUND, 4040, msg, None),
            GatewayError::Conflict { message, details } => {
                (StatusCode::CONFLICT, 4090, message, Some(details))
            }
            GatewayError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, 4220, msg, None),
            GatewayError::Provider(msg) => {
                tracing::error!(error = %msg, "provider error");
                (
                    StatusCode::BAD_GATEWAY,
                    5020,
                    "payment provider error".to_string(),
                    None,
                )
            }
            GatewayError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, 5030, msg, None),
            GatewayError::Signature(msg) => {
                tracing::warn!(error = %msg, "signature verification failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    5000,
                    "signature verification failed".to_string(),
                    None,
                )
            }
            GatewayError::UnsupportedEvent(msg) => (StatusCode::BAD_REQUEST, 4000, msg, None),
            GatewayError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    5000,
                    "internal error".to_string(),
                    None,
                )
            }
            GatewayError::Serialization(err) => {
                tracing::error!(error = %err, "serialization error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    5000,
                    "internal error".to_string(),
                    None,
                )
            }
            GatewayError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    5000,
                    "internal error".to_string(),
                    None,
                )
            }
        };

        let body = serde_json::json!({
            "code": code,
            "msg": msg,
            "data": data,
        });
        (status, Json(body)).into_response()
    }
}
