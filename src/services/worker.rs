use {
    crate::domain::delivery::{WebhookDelivery, retry_backoff},
    crate::domain::error::GatewayError,
    crate::infra::postgres::delivery_repo,
    sqlx::PgPool,
    std::time::Duration,
    tokio::sync::watch,
};

const ERROR_SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_retries: i32,
    pub request_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_retries: 10,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Poll the outbound queue and deliver due webhooks until shutdown.
///
/// Delivery failures never propagate out of the loop; they are recorded on
/// the row and retried with backoff until the row goes dead.
pub async fn run_worker(pool: PgPool, cfg: WorkerConfig, mut shutdown: watch::Receiver<bool>) {
    let client = match reqwest::Client::builder()
        .timeout(cfg.request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to build delivery HTTP client");
            return;
        }
    };

    tracing::info!(
        poll_interval_secs = cfg.poll_interval.as_secs(),
        batch_size = cfg.batch_size,
        max_retries = cfg.max_retries,
        "delivery worker started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("delivery worker shutting down");
                return;
            }
            _ = tokio::time::sleep(cfg.poll_interval) => {}
        }

        if let Err(e) = poll_once(&pool, &client, &cfg).await {
            tracing::error!(error = %e, "delivery worker poll error");
        }
    }
}

/// Claim one batch of due deliveries and attempt each.
pub async fn poll_once(
    pool: &PgPool,
    client: &reqwest::Client,
    cfg: &WorkerConfig,
) -> Result<(), GatewayError> {
    let mut tx = pool.begin().await?;
    let batch = delivery_repo::claim_due(&mut tx, cfg.batch_size, cfg.max_retries).await?;
    tx.commit().await?;

    if batch.is_empty() {
        return Ok(());
    }

    tracing::info!(count = batch.len(), "processing delivery batch");
    for delivery in batch {
        if let Err(e) = try_deliver(pool, client, &delivery, cfg.max_retries).await {
            tracing::error!(
                delivery_id = %delivery.id,
                error = %e,
                "delivery attempt could not be recorded"
            );
        }
    }
    Ok(())
}

/// POST the payload to the merchant and settle the row. The attempt itself
/// was already recorded by the claim (status processing, counter bumped).
pub async fn try_deliver(
    pool: &PgPool,
    client: &reqwest::Client,
    delivery: &WebhookDelivery,
    max_retries: i32,
) -> Result<(), GatewayError> {
    tracing::info!(
        delivery_id = %delivery.id,
        event_id = %delivery.event_id,
        event_type = %delivery.event_type,
        attempt_count = delivery.attempt_count,
        notify_url = %delivery.notify_url,
        "delivering webhook"
    );

    match client
        .post(&delivery.notify_url)
        .json(&delivery.payload)
        .send()
        .await
    {
        Ok(response) => {
            let http_status = response.status().as_u16() as i32;
            if response.status().is_success() {
                delivery_repo::mark_succeeded(pool, delivery.id, http_status).await?;
                tracing::info!(delivery_id = %delivery.id, http_status, "webhook delivered");
            } else {
                let body = response.text().await.unwrap_or_default();
                let error = truncate_error(&format!("HTTP {http_status}: {body}"));
                schedule_retry(pool, delivery, Some(http_status), &error, max_retries).await?;
            }
        }
        Err(e) => {
            let error = truncate_error(&format!("RequestError: {e}"));
            schedule_retry(pool, delivery, None, &error, max_retries).await?;
        }
    }
    Ok(())
}

/// Exponential backoff with jitter, or dead-letter once retries are exhausted.
async fn schedule_retry(
    pool: &PgPool,
    delivery: &WebhookDelivery,
    http_status: Option<i32>,
    error: &str,
    max_retries: i32,
) -> Result<(), GatewayError> {
    if delivery.attempt_count >= max_retries {
        delivery_repo::mark_dead(pool, delivery.id, http_status, error).await?;
        tracing::error!(
            delivery_id = %delivery.id,
            event_id = %delivery.event_id,
            attempt_count = delivery.attempt_count,
            last_error = error,
            "delivery dead-lettered"
        );
    } else {
        let delay = retry_backoff(delivery.attempt_count, rand::random::<f64>());
        delivery_repo::mark_failed_retry(pool, delivery.id, http_status, error, delay).await?;
        tracing::warn!(
            delivery_id = %delivery.id,
            attempt_count = delivery.attempt_count,
            retry_in_secs = delay.as_secs_f64(),
            last_error = error,
            "delivery failed, retry scheduled"
        );
    }
    Ok(())
}

/// Periodically reset deliveries stuck in `processing` back into the retry
/// path. A row only strands there when a worker dies between the claim and
/// the settle.
pub async fn run_reaper(pool: PgPool, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("stuck delivery reaper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stuck delivery reaper shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(60)) => {}
        }

        match delivery_repo::reap_stuck(&pool).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "reaped stuck deliveries"),
            Err(e) => tracing::error!(error = %e, "reaper error"),
        }
    }
}

fn truncate_error(s: &str) -> String {
    match s.char_indices().nth(ERROR_SNIPPET_LEN) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_error_bounds_length() {
        let long = "x".repeat(500);
        assert_eq!(truncate_error(&long).len(), ERROR_SNIPPET_LEN);
        assert_eq!(truncate_error("short"), "short");
        // never panics on multi-byte boundaries
        let multi = "é".repeat(300);
        assert_eq!(truncate_error(&multi).chars().count(), ERROR_SNIPPET_LEN);
    }
}
