use std::sync::Arc;

use parley_agent::{ChatCompletionsClient, ChatRouter, RouterError};
use parley_core::config::{AppConfig, LoadOptions, LogFormat};
use parley_core::domain::message::UserId;
use parley_db::{connect, migrations, SqlCollectionStore, SqlConversationRepository};
use tracing::Level;

use crate::commands::{
    current_thread_runtime, CommandFailure, CommandResult, EXIT_COMPLETION, EXIT_CONFIG,
    EXIT_DATABASE, EXIT_MIGRATION, EXIT_PERSISTENCE,
};

pub fn run(user_id: &str, message: &str) -> CommandResult {
    match route_once(user_id, message) {
        Ok(reply) => CommandResult::success("chat", reply),
        Err(failure) => failure.into_result("chat"),
    }
}

fn route_once(user_id: &str, message: &str) -> Result<String, CommandFailure> {
    let user_id = UserId::parse(user_id)
        .map_err(|error| CommandFailure::new("input_validation", error.to_string(), EXIT_CONFIG))?;
    if message.trim().is_empty() {
        return Err(CommandFailure::new(
            "input_validation",
            "message must not be empty",
            EXIT_CONFIG,
        ));
    }

    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandFailure::new(
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })?;
    init_stderr_logging(&config);

    let llm = ChatCompletionsClient::from_config(&config.llm).map_err(|error| {
        CommandFailure::new("completion_client", error.to_string(), EXIT_COMPLETION)
    })?;

    current_thread_runtime()?.block_on(async {
        let pool = connect(&config.database).await.map_err(|error| {
            CommandFailure::new("db_connectivity", error.to_string(), EXIT_DATABASE)
        })?;
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return Err(CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION));
        }

        let chat_router = ChatRouter::from_config(
            &config,
            Arc::new(llm),
            Arc::new(SqlConversationRepository::new(pool.clone())),
            Arc::new(SqlCollectionStore::new(pool.clone())),
        )
        .map_err(|error| {
            CommandFailure::new(
                "config_validation",
                format!("router.collection_pattern is not a valid regex: {error}"),
                EXIT_CONFIG,
            )
        });

        let reply = match chat_router {
            Ok(chat_router) => chat_router.route(&user_id, message).await.map_err(
                |RouterError::Persistence(error)| {
                    CommandFailure::new("persistence", error.to_string(), EXIT_PERSISTENCE)
                },
            ),
            Err(failure) => Err(failure),
        };

        pool.close().await;
        reply
    })
}

/// Router events go to stderr so stdout stays a single JSON document.
fn init_stderr_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when commands run inside one process.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
