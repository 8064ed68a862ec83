use std::process;
use clap::Parser;

use hpa_myths::cli::Cli;

#[tokio::main]
async fn main() {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        tracing::error!(code = e.error_code(), "{}", e);
        eprintln!("Error: {}", e);
        if e.is_user_error() {
            eprintln!("Check the configuration, or write a fresh one with `hpa-myths init --force`.");
        }
        process::exit(1);
    }
}
