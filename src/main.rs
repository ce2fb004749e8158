//! Wagon pub/sub delivery service.
//!
//! Main entry point: loads configuration, establishes the database pool,
//! bootstraps the schema and runs the delivery worker until a shutdown
//! signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wagon_core::{storage::Storage, RealClock};
use wagon_delivery::{
    DeliveryConfig, DeliveryWorker, GatewayConfig, LogSink, PostgresStore, RetryPolicy,
    SubscriberUrlProvider, WebhookGateway,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting wagon delivery service");

    let config = Config::from_env()?;
    info!(
        batch_size = config.delivery.batch_size,
        poll_interval_secs = config.delivery.poll_interval.as_secs(),
        max_connections = config.database_max_connections,
        "configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    run_migrations(&pool).await?;
    info!("database schema ready");

    let storage = Arc::new(Storage::new(pool.clone()));
    let store = Arc::new(PostgresStore::new(storage));
    let clock = Arc::new(RealClock::new());

    let gateway = Arc::new(
        WebhookGateway::new(GatewayConfig {
            timeout: config.gateway_timeout,
            ..GatewayConfig::default()
        })
        .context("failed to build webhook gateway")?,
    );
    let urls = Arc::new(SubscriberUrlProvider::new(store.clone()));

    let cancel = CancellationToken::new();
    let worker = DeliveryWorker::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        urls,
        gateway,
        Arc::new(LogSink),
        config.delivery,
        clock,
        cancel.clone(),
    )
    .context("failed to build delivery worker")?;

    info!("retry schedule:\n{}", worker.retry_schedule());

    let worker_handle = tokio::spawn(async move { worker.run().await });

    shutdown_signal().await;
    info!("shutdown signal received, stopping worker");

    cancel.cancel();
    tokio::select! {
        _ = worker_handle => {
            info!("worker stopped");
        }
        () = tokio::time::sleep(Duration::from_secs(30)) => {
            info!("shutdown grace period expired");
        }
    }

    pool.close().await;
    info!("database connections closed");

    info!("wagon shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,wagon=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Bootstraps the schema if absent.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic (
            id BIGSERIAL PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create topic table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publisher (
            id BIGSERIAL PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create publisher table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriber (
            id BIGSERIAL PRIMARY KEY,
            client_id BIGINT NOT NULL,
            name TEXT NOT NULL,
            webhook_url TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create subscriber table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscription (
            id BIGSERIAL PRIMARY KEY,
            subscriber_id BIGINT NOT NULL REFERENCES subscriber(id),
            topic_id BIGINT NOT NULL REFERENCES topic(id),
            identifier TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create subscription table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS message (
            id BIGSERIAL PRIMARY KEY,
            topic_id BIGINT NOT NULL REFERENCES topic(id),
            identifier TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create message table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue (
            id BIGSERIAL PRIMARY KEY,
            subscription_id BIGINT NOT NULL REFERENCES subscription(id),
            message_id BIGINT NOT NULL REFERENCES message(id),
            status TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TIMESTAMPTZ,
            next_retry_at TIMESTAMPTZ,
            last_error TEXT,
            expires_at TIMESTAMPTZ NOT NULL,
            sequence_number BIGINT NOT NULL DEFAULT 0,
            operation_timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create queue table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dlq (
            id BIGSERIAL PRIMARY KEY,
            subscription_id BIGINT NOT NULL,
            message_id BIGINT NOT NULL,
            original_queue_id BIGINT NOT NULL,
            attempt_count INTEGER NOT NULL,
            last_error TEXT NOT NULL DEFAULT '',
            failure_reason TEXT NOT NULL,
            first_attempt_at TIMESTAMPTZ NOT NULL,
            last_attempt_at TIMESTAMPTZ NOT NULL,
            moved_to_dlq_at TIMESTAMPTZ NOT NULL,
            message_data TEXT NOT NULL,
            callback_url TEXT NOT NULL,
            is_resolved BOOLEAN NOT NULL DEFAULT FALSE,
            resolved_at TIMESTAMPTZ,
            resolved_by TEXT,
            resolution_note TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create dlq table")?;

    // Worker hot-path indexes.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_status_retry ON queue(status, next_retry_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create queue status index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queue_expiry ON queue(expires_at, status)")
        .execute(pool)
        .await
        .context("Failed to create queue expiry index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_sequence ON queue(subscription_id, sequence_number)",
    )
    .execute(pool)
    .await
    .context("Failed to create queue sequence index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_subscription_identifier \
         ON subscription(identifier) WHERE is_active",
    )
    .execute(pool)
    .await
    .context("Failed to create subscription identifier index")?;

    Ok(())
}

/// Waits for a shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}

/// Service configuration, loaded from the environment.
struct Config {
    /// PostgreSQL connection string.
    database_url: String,
    /// Maximum database connections.
    database_max_connections: u32,
    /// Worker batch size, poll interval and retry policy.
    delivery: DeliveryConfig,
    /// Webhook HTTP timeout.
    gateway_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        let database_max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10);

        let delivery = DeliveryConfig {
            batch_size: env_parse("WAGON_BATCH_SIZE", wagon_delivery::DEFAULT_BATCH_SIZE),
            poll_interval: Duration::from_secs(env_parse("WAGON_WORKER_INTERVAL_SECS", 30)),
            retry_policy: RetryPolicy {
                max_attempts: env_parse("WAGON_MAX_ATTEMPTS", 10),
                base_delay: Duration::from_secs(env_parse("WAGON_BASE_DELAY_SECS", 30)),
                max_delay: Duration::from_secs(env_parse("WAGON_MAX_DELAY_SECS", 30 * 60)),
                exponential_base: env_parse("WAGON_EXPONENTIAL_BASE", 2.0),
                dlq_threshold: env_parse("WAGON_DLQ_THRESHOLD", 5),
            },
        };

        let gateway_timeout = Duration::from_secs(env_parse("WAGON_GATEWAY_TIMEOUT_SECS", 30));

        Ok(Self { database_url, database_max_connections, delivery, gateway_timeout })
    }
}

/// Reads an environment variable, falling back to the default when unset or
/// unparsable.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|value| value.parse().ok()).unwrap_or(default)
}
