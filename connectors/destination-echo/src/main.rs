//! Echo destination for Tributary
//!
//! Speaks the destination side of the protocol: records are counted per stream and
//! dropped, every STATE message is acknowledged on stdout once the records before it
//! have been "written". Useful for exercising the adapter without a real warehouse.
//!
//! Usage:
//!   tributary-destination-echo write --config destination_config.json --catalog destination_catalog.json

mod args;
mod echo;

use anyhow::Context;
use args::WriteArgs;
use echo::{EchoDestination, EchoSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tributary_common::ConfiguredCatalog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = WriteArgs::parse(std::env::args().skip(1))?;
    tracing::info!("Starting echo destination");

    let settings: EchoSettings = read_json(&args.config)
        .await
        .context("failed to load destination config")?;
    let catalog: ConfiguredCatalog = read_json(&args.catalog)
        .await
        .context("failed to load configured catalog")?;
    tracing::info!("Configured streams: {}", catalog.streams.len());

    let mut destination = EchoDestination::new(settings, catalog);
    let summary = destination
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await?;

    tracing::info!(
        "Input ended: {} records, {} states acknowledged",
        summary.records,
        summary.states
    );

    if let Some(code) = destination.settings().exit_code {
        tracing::warn!("Exiting with configured code {}", code);
        std::process::exit(code);
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid JSON in {}", path))
}

/// Initialize tracing/logging. Logs go to stderr, stdout carries protocol messages.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
