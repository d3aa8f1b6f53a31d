use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        details: serde_json::Value,
    },

    #[error("validation: {0}")]
    Validation(String),

    #[error("provider: {0}")]
    Provider(String),

    #[error("callback signature: {0}")]
    Signature(String),

    #[error("unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn conflict(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }

    /// Whether the underlying database error is a unique-constraint violation,
    /// optionally against a specific named constraint.
    pub fn is_unique_violation(&self, constraint: Option<&str>) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
                    && constraint.is_none_or(|name| db.constraint() == Some(name))
            }
            _ => false,
        }
    }
}
