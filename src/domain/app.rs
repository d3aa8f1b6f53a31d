use {
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

/// Merchant tenant. Looked up by api_key on every authenticated request;
/// `notify_url` is the fallback target for outbound webhooks.
#[derive(Debug, Clone)]
pub struct App {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub is_active: bool,
    pub notify_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
