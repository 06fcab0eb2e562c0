use clap::Parser;

use forward_sync::cli::{self, Cli};
use forward_sync::config::{self, AppConfig};

/// Exit code for configuration, credential and connectivity failures.
const EXIT_SETUP_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Before tracing init so LOG_LEVEL from the file is honored.
    let env_file = config::load_env_file(cli.env.as_deref());

    let default_level = config::log_filter(cli.debug, |key| std::env::var(key).ok());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&default_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match env_file {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Loaded env file"),
        Ok(None) => tracing::debug!("No .env file found, using process environment"),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(EXIT_SETUP_FAILURE);
        }
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(EXIT_SETUP_FAILURE);
        }
    };

    match cli::execute(cli.command, config).await {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(EXIT_SETUP_FAILURE);
        }
    }
}
