use parley_core::config::{AppConfig, LoadOptions};
use parley_db::{connect, migrations};

use crate::commands::{
    current_thread_runtime, CommandFailure, CommandResult, EXIT_CONFIG, EXIT_DATABASE,
    EXIT_MIGRATION,
};

pub fn run() -> CommandResult {
    match apply() {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure.into_result("migrate"),
    }
}

fn apply() -> Result<(), CommandFailure> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandFailure::new(
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })?;

    current_thread_runtime()?.block_on(async {
        let pool = connect(&config.database).await.map_err(|error| {
            CommandFailure::new("db_connectivity", error.to_string(), EXIT_DATABASE)
        })?;
        let applied = migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION));
        pool.close().await;
        applied
    })
}
