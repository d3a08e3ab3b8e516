//! Slow Track VP CLI entry point
//!
//! Configuration is loaded from environment variables (via .env file).
//! Command-line arguments override environment variables.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vp_cli::{handler, Cli};
use vp_core::logging::LogLevel;

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.effective_log_level());

    if let Err(e) = handler::run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// RUST_LOG wins; otherwise every workspace crate logs at `level`
fn init_logging(level: LogLevel) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.workspace_directive())),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
