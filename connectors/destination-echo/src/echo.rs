//! Echo destination logic.

use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tributary_common::{ConfiguredCatalog, MessageType, ProtocolMessage};

/// Connection configuration understood by the echo destination
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EchoSettings {
    /// Emit a TRACE message with per-stream counts once input ends
    #[serde(default)]
    pub emit_summary_trace: bool,

    /// Exit with this code after input ends, to simulate a failing destination
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
    pub records: u64,
    pub states: u64,
}

pub struct EchoDestination {
    settings: EchoSettings,
    catalog: ConfiguredCatalog,
    records_per_stream: HashMap<String, u64>,
    summary: Summary,
}

impl EchoDestination {
    pub fn new(settings: EchoSettings, catalog: ConfiguredCatalog) -> Self {
        Self {
            settings,
            catalog,
            records_per_stream: HashMap::new(),
            summary: Summary::default(),
        }
    }

    pub fn settings(&self) -> &EchoSettings {
        &self.settings
    }

    /// Consume `input` until it closes, acknowledging STATE messages on `output`
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> anyhow::Result<Summary>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(input).lines();

        while let Some(line) = lines.next_line().await.context("failed to read input")? {
            if line.trim().is_empty() {
                continue;
            }
            let message = match ProtocolMessage::from_json_line(&line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Skipping malformed input line: {}", e);
                    continue;
                }
            };

            match message.kind() {
                MessageType::Record => self.write_record(&message),
                MessageType::State => {
                    // Everything before the checkpoint is "persisted" at this point
                    emit(&mut output, &message).await?;
                    self.summary.states += 1;
                }
                other => tracing::debug!("Ignoring {} message", other),
            }
        }

        if self.settings.emit_summary_trace {
            let trace = ProtocolMessage::trace(json!({
                "type": "SUMMARY",
                "records_per_stream": self.records_per_stream,
            }));
            emit(&mut output, &trace).await?;
        }
        output.flush().await.context("failed to flush output")?;

        Ok(self.summary.clone())
    }

    fn write_record(&mut self, message: &ProtocolMessage) {
        let record = message.payload();
        let stream = record
            .and_then(|r| r.get("stream"))
            .and_then(|s| s.as_str())
            .unwrap_or_default();
        let namespace = record
            .and_then(|r| r.get("namespace"))
            .and_then(|s| s.as_str());

        if self.catalog.find(stream, namespace).is_none() {
            tracing::warn!("Record for unconfigured stream '{}'", stream);
        }

        *self.records_per_stream.entry(stream.to_string()).or_default() += 1;
        self.summary.records += 1;
    }
}

async fn emit<W: AsyncWrite + Unpin>(output: &mut W, message: &ProtocolMessage) -> anyhow::Result<()> {
    let mut line = message.to_json_line()?;
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .await
        .context("failed to write output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;
    use tributary_common::ConfiguredStream;

    fn catalog() -> ConfiguredCatalog {
        ConfiguredCatalog::new(vec![ConfiguredStream::new("users", json!({}))])
    }

    fn output_messages(output: &[u8]) -> Vec<ProtocolMessage> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| ProtocolMessage::from_json_line(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_acknowledges_states_in_order() {
        let input = Builder::new()
            .read(b"{\"type\":\"RECORD\",\"record\":{\"stream\":\"users\",\"data\":{}}}\n")
            .read(b"{\"type\":\"STATE\",\"state\":{\"n\":1}}\n")
            .read(b"not json\n\n")
            .read(b"{\"type\":\"RECORD\",\"record\":{\"stream\":\"users\",\"data\":{}}}\n")
            .read(b"{\"type\":\"STATE\",\"state\":{\"n\":2}}\n")
            .build();
        let mut output = Vec::new();

        let mut destination = EchoDestination::new(EchoSettings::default(), catalog());
        let summary = destination.run(input, &mut output).await.unwrap();

        assert_eq!(summary, Summary { records: 2, states: 2 });
        assert_eq!(
            output_messages(&output),
            vec![
                ProtocolMessage::state(json!({"n": 1})),
                ProtocolMessage::state(json!({"n": 2})),
            ]
        );
    }

    #[tokio::test]
    async fn test_summary_trace_counts_records_per_stream() {
        let input: &[u8] = b"{\"type\":\"RECORD\",\"record\":{\"stream\":\"users\"}}\n\
                             {\"type\":\"RECORD\",\"record\":{\"stream\":\"orders\"}}\n\
                             {\"type\":\"RECORD\",\"record\":{\"stream\":\"users\"}}\n";
        let mut output = Vec::new();
        let settings = EchoSettings {
            emit_summary_trace: true,
            ..Default::default()
        };

        let mut destination = EchoDestination::new(settings, catalog());
        destination.run(input, &mut output).await.unwrap();

        let messages = output_messages(&output);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageType::Trace);
        assert_eq!(
            messages[0].payload().unwrap()["records_per_stream"],
            json!({"users": 2, "orders": 1})
        );
    }
}
