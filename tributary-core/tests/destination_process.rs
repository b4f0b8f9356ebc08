//! Destination adapter against real connector processes.
#![cfg(unix)]

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tributary_core::{
    ConfiguredCatalog, DefaultDestination, Destination, DestinationConfig, DestinationStartConfig,
    LauncherSettings, MessageType, NoopTimeoutMonitor, ProtocolMessage, ShutdownSettings,
    DESTINATION_CATALOG_JSON_FILENAME, DESTINATION_CONFIG_JSON_FILENAME,
};

/// Destination running `sh -c <script>`; `$2` is the config path and `$4` the catalog path
fn destination(script: &str) -> DefaultDestination {
    let config = DestinationConfig {
        connector_name: "dest-sh".to_string(),
        launcher: LauncherSettings {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        },
        shutdown: ShutdownSettings {
            grace_period_ms: 300,
            last_chance_ms: 300,
            ..Default::default()
        },
        ..Default::default()
    };

    DefaultDestination::from_config(&config, Arc::new(NoopTimeoutMonitor)).unwrap()
}

fn start_config() -> DestinationStartConfig {
    DestinationStartConfig::new(json!({"dsn": "postgres://db"}), ConfiguredCatalog::default())
}

async fn started(script: &str) -> (DefaultDestination, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut destination = destination(script);
    destination
        .start(&start_config(), &dir.path().join("job"))
        .await
        .unwrap();
    (destination, dir)
}

async fn wait_until_finished(destination: &mut DefaultDestination) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !destination.is_finished().await.unwrap() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("destination did not finish");
}

#[tokio::test]
async fn test_sync_with_clean_exit() {
    let script = r#"
        count=0
        while IFS= read -r line; do count=$((count + 1)); done
        echo "received $count messages" >&2
        echo "starting flush"
        echo '{"type":"RECORD","record":{"stream":"users"}}'
        echo "{\"type\":\"STATE\",\"state\":{\"count\":$count}}"
        echo '{"type":"TRACE","trace":{"type":"ESTIMATE"}}'
    "#;
    let (mut destination, dir) = started(script).await;

    let job_root = dir.path().join("job");
    let config = std::fs::read_to_string(job_root.join(DESTINATION_CONFIG_JSON_FILENAME)).unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&config).unwrap(),
        json!({"dsn": "postgres://db"})
    );
    assert!(job_root.join(DESTINATION_CATALOG_JSON_FILENAME).exists());

    for n in 0..3 {
        destination
            .accept(&ProtocolMessage::record(json!({"data": {"id": n}})))
            .await
            .unwrap();
    }
    destination.notify_end_of_input().await.unwrap();

    let state = destination.attempt_read().await.unwrap().unwrap();
    assert_eq!(state.kind(), MessageType::State);
    assert_eq!(state.payload(), Some(&json!({"count": 3})));

    let trace = destination.attempt_read().await.unwrap().unwrap();
    assert_eq!(trace.kind(), MessageType::Trace);
    assert!(destination.attempt_read().await.unwrap().is_none());

    wait_until_finished(&mut destination).await;
    destination.close().await.unwrap();
    assert_eq!(destination.exit_value().unwrap(), 0);
}

#[tokio::test]
async fn test_failing_connector_fails_close() {
    let (mut destination, _dir) = started("cat > /dev/null; echo 'disk full' >&2; exit 1").await;

    let err = destination.close().await.unwrap_err();

    assert!(err.is_abnormal_exit());
    assert!(err.to_string().contains("exit with code 1"));
    assert_eq!(destination.exit_value().unwrap(), 1);
}

#[tokio::test]
async fn test_termination_request_is_accepted_exit() {
    let (mut destination, _dir) = started("exec sleep 30").await;

    destination.close().await.unwrap();

    assert_eq!(destination.exit_value().unwrap(), 143);
}

#[tokio::test]
async fn test_unresponsive_connector_is_killed() {
    let (mut destination, _dir) =
        started("trap '' TERM; while true; do sleep 0.05; done").await;

    let err = destination.close().await.unwrap_err();

    assert!(err.to_string().contains("exit with code 137"));
    assert!(err.to_string().contains("normal if the job was cancelled"));
}

#[tokio::test]
async fn test_cancel_from_another_task() {
    let (mut destination, _dir) = started("exec sleep 30").await;
    let canceller = destination.canceller();

    tokio::spawn(async move { canceller.cancel() })
        .await
        .unwrap()
        .unwrap();

    wait_until_finished(&mut destination).await;
    assert_eq!(destination.exit_value().unwrap(), 137);
}

#[tokio::test]
async fn test_cancel_after_exit_is_noop() {
    let (mut destination, _dir) = started("exit 0").await;
    wait_until_finished(&mut destination).await;

    destination.cancel().unwrap();

    assert_eq!(destination.exit_value().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_program_is_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = DestinationConfig {
        launcher: LauncherSettings {
            command: "/nonexistent/destination-binary".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut destination =
        DefaultDestination::from_config(&config, Arc::new(NoopTimeoutMonitor)).unwrap();

    let err = destination
        .start(&start_config(), Path::new(dir.path()))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("/nonexistent/destination-binary"));
    destination.close().await.unwrap();
}
