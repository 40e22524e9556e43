mod commands;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use plotpot_client::{BackendKind, ClientConfig, PlotPot};
use plotpot_db::LocalBackend;
use plotpot_rest::RestBackend;

use commands::Command;

#[derive(Parser)]
#[command(name = "plotpot")]
#[command(about = "Collaborative story writing from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plotpot=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;

    match config.backend {
        BackendKind::Local => {
            info!("Using local store at {}", config.db_path.display());
            let backend = LocalBackend::open(&config.db_path, &config.jwt_secret)?;
            commands::run(PlotPot::new(backend), cli.command).await
        }
        BackendKind::Rest => {
            let rest = config
                .rest
                .as_ref()
                .context("rest backend selected without connection settings")?;
            info!("Using hosted backend at {}", rest.url);
            let backend = RestBackend::new(&rest.url, &rest.api_key, config.timeout)?;
            commands::run(PlotPot::new(backend), cli.command).await
        }
    }
}
