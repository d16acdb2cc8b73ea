use std::sync::Arc;

use parley_agent::{ChatCompletionsClient, ChatRouter, CompletionError};
use parley_core::config::{AppConfig, ConfigError};
use parley_db::{connect, migrations, DbPool, SqlCollectionStore, SqlConversationRepository};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub chat_router: Arc<ChatRouter>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("completion client setup failed: {0}")]
    CompletionClient(#[source] CompletionError),
    #[error("router.collection_pattern is not a valid regex: {0}")]
    CollectionPattern(#[source] regex::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = ChatCompletionsClient::from_config(&config.llm)
        .map_err(BootstrapError::CompletionClient)?;
    info!(
        event_name = "system.bootstrap.completion_client_ready",
        correlation_id = "bootstrap",
        endpoint = %llm.endpoint(),
        model = %config.llm.model,
        translator_model = %config.llm.effective_translator_model(),
        "completion client configured"
    );

    let chat_router = ChatRouter::from_config(
        &config,
        Arc::new(llm),
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        Arc::new(SqlCollectionStore::new(db_pool.clone())),
    )
    .map_err(BootstrapError::CollectionPattern)?;

    Ok(Application { config, db_pool, chat_router: Arc::new(chat_router) })
}
