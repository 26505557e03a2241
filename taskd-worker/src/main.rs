//! Standalone scheduler process: bootstraps the task engine (pools,
//! adapters, reloaded history) without the HTTP surface. `taskd-api` is
//! the full daemon binary — it builds this same `Scheduler` and
//! additionally serves the HTTP API on top of it. Running this binary on
//! its own is useful for headless operation or integration testing
//! against a populated database with no HTTP exposure at all.

use std::sync::Arc;
use taskd_shared::config::{AppConfig, DbSettings, RedisSettings};
use taskd_shared::db;
use taskd_shared::index::{RedisTaskIndex, TaskIndex};
use taskd_shared::phase::Timeout;
use taskd_shared::redis::{RedisClient, RedisConfig};
use taskd_worker::adapters;
use taskd_worker::registry::EngineRegistry;
use taskd_worker::scheduler::Scheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "taskd_worker=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("taskd-worker v{} starting", taskd_shared::VERSION);

    let config_path = std::env::var("TASKD_CONFIG").unwrap_or_else(|_| "./env.yaml".to_string());
    let config = AppConfig::load(&config_path)?;

    let db_pool = db::pool::create_pool(db::pool::DatabaseConfig {
        url: database_url(&config.db),
        ..Default::default()
    })
    .await?;
    db::migrations::run_migrations(&db_pool).await?;

    let redis_client = RedisClient::new(RedisConfig {
        url: redis_url(&config.redis),
        connection_timeout_secs: 5,
        command_timeout_secs: 10,
    })
    .await?;
    let index: Arc<dyn TaskIndex> = Arc::new(RedisTaskIndex::new(redis_client));

    let default_timeout: Timeout = config.timeout.to_timeout_setting().resolve(&Timeout::default());

    let registry = Arc::new(EngineRegistry::new());
    adapters::register_all(&registry, index.clone(), default_timeout).await;

    let scheduler = Scheduler::new(registry, index, db_pool, default_timeout);
    scheduler.bootstrap().await?;

    tracing::info!("taskd-worker ready; pools and templates are managed through the HTTP API");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, exiting");
    Ok(())
}

fn database_url(db: &DbSettings) -> String {
    format!("postgres://{}:{}@{}:{}/{}", db.user, db.password, db.host, db.port, db.database_name)
}

fn redis_url(redis: &RedisSettings) -> String {
    if redis.password.is_empty() {
        format!("redis://{}/{}", redis.addr, redis.db)
    } else {
        format!("redis://:{}@{}/{}", redis.password, redis.addr, redis.db)
    }
}
