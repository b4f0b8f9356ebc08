//! Drive a destination connector through a complete sync
//!
//! Writes a handful of records and checkpoints, then prints every acknowledgement
//! the connector sends back. Ctrl-C cancels the connector.
//!
//! Usage:
//!   cargo build -p tributary-destination-echo
//!   DESTINATION_COMMAND=target/debug/tributary-destination-echo \
//!   CONNECTOR_NAME=echo \
//!   cargo run --example run_destination

use serde_json::json;
use std::sync::Arc;
use tributary_core::{
    init_tracing, ConfiguredCatalog, DefaultDestination, Destination, DestinationConfig,
    DestinationStartConfig, DestinationTimeoutMonitor, ProtocolMessage,
};
use tributary_common::ConfiguredStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DestinationConfig::from_env()?;
    init_tracing(&config.log_level);

    let monitor = Arc::new(DestinationTimeoutMonitor::new(&config.timeouts)?);
    let mut destination = DefaultDestination::from_config(&config, monitor.clone())?;

    let canceller = destination.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling destination");
            if let Err(e) = canceller.cancel() {
                tracing::error!("Cancel failed: {}", e);
            }
        }
    });

    let job_root = job_root_dir()?;
    let start = DestinationStartConfig::new(
        json!({"emit_summary_trace": true}),
        ConfiguredCatalog::new(vec![ConfiguredStream::new(
            "users",
            json!({"type": "object"}),
        )]),
    );

    let sync = async {
        destination.start(&start, &job_root).await?;

        for batch in 1..=3 {
            for id in 0..5 {
                let record = json!({"stream": "users", "data": {"id": batch * 10 + id}});
                destination.accept(&ProtocolMessage::record(record)).await?;
            }
            destination
                .accept(&ProtocolMessage::state(json!({"batch": batch})))
                .await?;
        }
        destination.notify_end_of_input().await?;

        while let Some(message) = destination.attempt_read().await? {
            println!("{} {}", message.kind(), message.to_json_line()?);
        }
        destination.close().await
    };

    monitor.run_with_timeout(sync).await?;
    println!("exit value: {}", destination.exit_value()?);
    Ok(())
}

fn job_root_dir() -> anyhow::Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("tributary-job-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
