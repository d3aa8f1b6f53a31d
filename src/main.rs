use {
    paygate::{
        AppState,
        adapters::ProviderRegistry,
        config::Settings,
        services::worker::{self, WorkerConfig},
        transport::http,
    },
    sqlx::postgres::PgPoolOptions,
    std::sync::Arc,
    std::time::Duration,
    tokio::sync::watch,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;

    let default_filter = if settings.database.echo {
        format!("{},sqlx=debug", settings.log_level)
    } else {
        settings.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter)),
        )
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections())
        .min_connections(settings.database.pool_size)
        .connect(&settings.database.url())
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let registry = ProviderRegistry::from_settings(&settings)?;
    for provider in registry.configured() {
        tracing::info!(provider = %provider, "provider adapter configured");
    }

    let state = AppState {
        pool: pool.clone(),
        registry,
        settings: Arc::new(settings.clone()),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker::run_worker(
        pool.clone(),
        WorkerConfig {
            poll_interval: settings.worker.poll_interval,
            batch_size: settings.worker.batch_size,
            max_retries: settings.worker.max_retries,
            request_timeout: Duration::from_secs(30),
        },
        shutdown_rx,
    ));
    let reaper_handle = tokio::spawn(worker::run_reaper(pool, shutdown_tx.subscribe()));

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = reaper_handle.await;
    Ok(())
}
