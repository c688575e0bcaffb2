use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

#[derive(Clone, Copy, Debug)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_connections: 10, acquire_timeout_secs: 5, idle_timeout_secs: 30 }
    }
}

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, PoolSettings::default()).await
}

/// Bounded pool: a hard cap on concurrent connections, a bounded wait on
/// acquisition, and idle connections reclaimed after a short window.
pub async fn connect_with_settings(
    database_url: &str,
    settings: PoolSettings,
) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs.max(1)))
        .idle_timeout(Duration::from_secs(settings.idle_timeout_secs.max(1)))
        .connect(database_url)
        .await
}
