//! acqsrv entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use acqsrv::transport::NetFactory;
use acqsrv::{AcqService, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "acqsrv", about = "GridLink Modbus data acquisition service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "ACQSRV_CONFIG", default_value = "acqsrv.yaml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("Loading configuration from {}", args.config.display()))?;

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let service = AcqService::new(config, Arc::new(NetFactory))?;
    let cancel = CancellationToken::new();
    let mut tasks = service.spawn_pollers(cancel.clone())?;

    tokio::signal::ctrl_c()
        .await
        .context("Waiting for shutdown signal")?;
    info!("Shutdown signal received");

    cancel.cancel();
    while tasks.join_next().await.is_some() {}
    service.shutdown().await;

    Ok(())
}
