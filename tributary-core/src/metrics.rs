//! Metrics for destination processes, exported through the `metrics` facade.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tributary_common::MessageType;

/// Per-destination metric recorder
#[derive(Debug, Clone)]
pub struct DestinationMetrics {
    connector: String,
}

impl DestinationMetrics {
    pub fn new(connector_name: &str) -> Self {
        Self {
            connector: connector_name.to_string(),
        }
    }

    /// Message written to the connector's input stream
    pub fn record_written(&self, elapsed: Duration) {
        counter!("tributary_destination_messages_written_total", "connector" => self.connector.clone())
            .increment(1);
        histogram!("tributary_destination_accept_seconds", "connector" => self.connector.clone())
            .record(elapsed.as_secs_f64());
    }

    /// Message surfaced from the connector's output stream
    pub fn record_read(&self, kind: MessageType) {
        counter!(
            "tributary_destination_messages_read_total",
            "connector" => self.connector.clone(),
            "type" => kind.as_str()
        )
        .increment(1);
    }

    /// Message discarded by the accepted-kind filter
    pub fn record_dropped(&self, kind: MessageType) {
        counter!(
            "tributary_destination_messages_dropped_total",
            "connector" => self.connector.clone(),
            "type" => kind.as_str()
        )
        .increment(1);
    }

    pub fn record_exit_code(&self, code: i32) {
        counter!(
            "tributary_destination_exits_total",
            "connector" => self.connector.clone(),
            "code" => code.to_string()
        )
        .increment(1);
    }

    pub fn record_cancel(&self) {
        counter!("tributary_destination_cancellations_total", "connector" => self.connector.clone())
            .increment(1);
    }

    pub fn record_timeout(&self, operation: &'static str) {
        counter!(
            "tributary_destination_timeouts_total",
            "connector" => self.connector.clone(),
            "operation" => operation
        )
        .increment(1);
    }

    pub fn set_running(&self, running: bool) {
        gauge!("tributary_destination_running", "connector" => self.connector.clone())
            .set(if running { 1.0 } else { 0.0 });
    }
}
