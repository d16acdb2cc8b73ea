use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing .env file is normal outside local development.
    let _ = dotenvy::dotenv();
    parley_cli::run()
}
