use std::sync::Arc;
use std::time::Duration;

use leadlens_agent::{ChatPipeline, OpenAiClient, PipelineModels, ThreadStore, ThreadStoreConfig};
use leadlens_core::config::AppConfig;
use leadlens_db::{connect_with_settings, DbPool, PgQueryExecutor, PoolSettings};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<ChatPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        config.database.url.expose_secret(),
        PoolSettings {
            max_connections: config.database.max_connections,
            acquire_timeout_secs: config.database.acquire_timeout_secs,
            idle_timeout_secs: config.database.idle_timeout_secs,
        },
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database pool established");

    let llm = Arc::new(OpenAiClient::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    ));
    let executor =
        Arc::new(PgQueryExecutor::new(db_pool.clone(), config.database.statement_timeout_ms));
    let threads = Arc::new(ThreadStore::new(ThreadStoreConfig::default()));

    let pipeline = Arc::new(ChatPipeline::new(
        llm,
        executor,
        threads,
        PipelineModels {
            generation: config.llm.generation_model.clone(),
            answer: config.llm.answer_model.clone(),
        },
    ));
    info!(event_name = "system.bootstrap.pipeline_ready", "chat pipeline wired");

    Ok(Application { config, db_pool, pipeline })
}
