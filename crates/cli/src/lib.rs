pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Operate Parley migrations, config inspection, readiness checks, and one-shot chat turns.",
    after_help = "Examples:\n  parley doctor --json\n  parley config\n  parley chat --user-id u-1 --message \"muestra los usuarios\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, completion endpoint, collection policy, and DB checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Route one message through the chat router and print the reply")]
    Chat {
        #[arg(long, help = "Identifier the turn is stored under")]
        user_id: String,
        #[arg(long, help = "Message text, routed exactly as the HTTP endpoint would")]
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Chat { user_id, message } => commands::chat::run(&user_id, &message),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
