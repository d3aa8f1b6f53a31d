use {
    crate::domain::app::App, crate::domain::error::GatewayError, sqlx::postgres::PgExecutor,
    uuid::Uuid,
};

const COLUMNS: &str = "id, name, api_key, is_active, notify_url, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AppRecord {
    id: Uuid,
    name: String,
    api_key: String,
    is_active: bool,
    notify_url: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<AppRecord> for App {
    fn from(r: AppRecord) -> Self {
        App {
            id: r.id,
            name: r.name,
            api_key: r.api_key,
            is_active: r.is_active,
            notify_url: r.notify_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub async fn find_by_api_key(
    executor: impl PgExecutor<'_>,
    api_key: &str,
) -> Result<Option<App>, GatewayError> {
    let row: Option<AppRecord> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM apps WHERE api_key = $1"))
            .bind(api_key)
            .fetch_optional(executor)
            .await?;
    Ok(row.map(App::from))
}

pub async fn notify_url_of(
    executor: impl PgExecutor<'_>,
    app_id: Uuid,
) -> Result<Option<String>, GatewayError> {
    let url: Option<Option<String>> =
        sqlx::query_scalar("SELECT notify_url FROM apps WHERE id = $1")
            .bind(app_id)
            .fetch_optional(executor)
            .await?;
    Ok(url.flatten())
}
