//! Message reader over the connector's output stream.
//!
//! Raw lines are turned into [`ProtocolMessage`]s by a [`MessageStream`] and then
//! narrowed down to the kinds the sync loop cares about by [`FilteredMessages`].

use super::BoxedRead;
use crate::{ConnectorError, ConnectorResult, DestinationMetrics};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};
use tributary_common::{MessageType, ProtocolMessage};

/// Kinds forwarded from a destination's output to the sync loop
pub const ACCEPTED_MESSAGE_TYPES: [MessageType; 3] =
    [MessageType::State, MessageType::Trace, MessageType::Control];

/// Sequence of protocol messages parsed from a connector's output
#[async_trait]
pub trait MessageStream: Send {
    /// Next message, or `None` once the output has ended
    async fn next_message(&mut self) -> ConnectorResult<Option<ProtocolMessage>>;
}

/// Creates a [`MessageStream`] over a connector's output stream
pub trait MessageStreamFactory: Send + Sync {
    fn create(&self, source: BoxedRead) -> Box<dyn MessageStream>;
}

/// Longest output line accepted by default
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Parses one JSON object per line.
///
/// Lines that are not JSON are connector chatter and get logged; JSON lines that
/// are not protocol messages are skipped with a warning. In strict mode both are
/// reported as invalid data instead. Invalid UTF-8 is replaced, and lines longer
/// than `max_line_bytes` are discarded the same way.
pub struct JsonLinesMessageStream<R = BoxedRead> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max_line_bytes: usize,
    fail_on_invalid_line: bool,
    ended: bool,
}

impl<R: AsyncRead + Send + Unpin> JsonLinesMessageStream<R> {
    pub fn new(source: R, fail_on_invalid_line: bool) -> Self {
        Self {
            reader: BufReader::new(source),
            buf: Vec::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            fail_on_invalid_line,
            ended: false,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Read the next raw line into `buf`. Returns false at end of output.
    async fn read_line(&mut self) -> ConnectorResult<bool> {
        self.buf.clear();
        let limit = (self.max_line_bytes as u64).saturating_add(1);
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| ConnectorError::io("Failed to read destination output", e))?;
        Ok(read > 0)
    }

    fn is_overlong(&self) -> bool {
        self.buf.len() > self.max_line_bytes && self.buf.last() != Some(&b'\n')
    }

    /// Drop the remainder of an overlong line
    async fn skip_rest_of_line(&mut self) -> ConnectorResult<()> {
        while self.read_line().await? {
            if self.buf.last() == Some(&b'\n') {
                return Ok(());
            }
        }
        self.ended = true;
        Ok(())
    }

    fn parse(&self, line: &str) -> ConnectorResult<Option<ProtocolMessage>> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                if self.fail_on_invalid_line {
                    return Err(ConnectorError::InvalidData {
                        message: format!("line is not JSON: {}", e),
                        line: line.to_string(),
                    });
                }
                info!("{}", line);
                return Ok(None);
            }
        };

        match serde_json::from_value::<ProtocolMessage>(value) {
            Ok(message) => Ok(Some(message)),
            Err(e) if self.fail_on_invalid_line => Err(ConnectorError::InvalidData {
                message: format!("not a protocol message: {}", e),
                line: line.to_string(),
            }),
            Err(e) => {
                warn!("Skipping invalid protocol message ({}): {}", e, line);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Send + Unpin> MessageStream for JsonLinesMessageStream<R> {
    async fn next_message(&mut self) -> ConnectorResult<Option<ProtocolMessage>> {
        while !self.ended {
            if !self.read_line().await? {
                self.ended = true;
                break;
            }

            if self.is_overlong() {
                let shown = self.buf.len().min(256);
                let prefix = String::from_utf8_lossy(&self.buf[..shown]).into_owned();
                if self.fail_on_invalid_line {
                    return Err(ConnectorError::InvalidData {
                        message: format!("line exceeds {} bytes", self.max_line_bytes),
                        line: prefix,
                    });
                }
                warn!(
                    "Skipping destination output line longer than {} bytes: {}...",
                    self.max_line_bytes, prefix
                );
                self.skip_rest_of_line().await?;
                continue;
            }

            let line = String::from_utf8_lossy(&self.buf).into_owned();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(message) = self.parse(trimmed)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

/// Factory for [`JsonLinesMessageStream`]
#[derive(Debug, Clone, Copy)]
pub struct JsonLinesStreamFactory {
    fail_on_invalid_line: bool,
    max_line_bytes: usize,
}

impl JsonLinesStreamFactory {
    pub fn new(fail_on_invalid_line: bool) -> Self {
        Self {
            fail_on_invalid_line,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }
}

impl Default for JsonLinesStreamFactory {
    fn default() -> Self {
        Self::new(false)
    }
}

impl MessageStreamFactory for JsonLinesStreamFactory {
    fn create(&self, source: BoxedRead) -> Box<dyn MessageStream> {
        Box::new(
            JsonLinesMessageStream::new(source, self.fail_on_invalid_line)
                .with_max_line_bytes(self.max_line_bytes),
        )
    }
}

/// Single-pass, kind-filtered view over a [`MessageStream`].
///
/// `has_next` may block until the connector writes an accepted message or closes
/// its output. Once exhausted the sequence stays exhausted.
pub struct FilteredMessages {
    inner: Box<dyn MessageStream>,
    accepted: Vec<MessageType>,
    peeked: Option<ProtocolMessage>,
    exhausted: bool,
    metrics: Option<DestinationMetrics>,
}

impl FilteredMessages {
    pub fn new(inner: Box<dyn MessageStream>, accepted: &[MessageType]) -> Self {
        Self {
            inner,
            accepted: accepted.to_vec(),
            peeked: None,
            exhausted: false,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DestinationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whether another accepted message is available, waiting for output if needed
    pub async fn has_next(&mut self) -> ConnectorResult<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }

        while !self.exhausted {
            match self.inner.next_message().await? {
                Some(message) if self.accepted.contains(&message.kind()) => {
                    self.peeked = Some(message);
                    return Ok(true);
                }
                Some(message) => {
                    debug!("Dropping {} message from destination output", message.kind());
                    if let Some(metrics) = &self.metrics {
                        metrics.record_dropped(message.kind());
                    }
                }
                None => self.exhausted = true,
            }
        }
        Ok(false)
    }

    /// Next accepted message, `None` when the sequence is exhausted
    pub async fn next(&mut self) -> ConnectorResult<Option<ProtocolMessage>> {
        if !self.has_next().await? {
            return Ok(None);
        }

        let message = self.peeked.take();
        if let (Some(metrics), Some(message)) = (&self.metrics, &message) {
            metrics.record_read(message.kind());
        }
        Ok(message)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.peeked.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn filtered(output: &'static [u8]) -> FilteredMessages {
        let source: BoxedRead = Box::new(Builder::new().read(output).build());
        FilteredMessages::new(
            JsonLinesStreamFactory::default().create(source),
            &ACCEPTED_MESSAGE_TYPES,
        )
    }

    #[tokio::test]
    async fn test_filters_to_accepted_kinds_in_order() {
        let mut messages = filtered(
            b"{\"type\":\"RECORD\",\"record\":{}}\n\
              {\"type\":\"STATE\",\"state\":{\"n\":1}}\n\
              {\"type\":\"LOG\",\"log\":{}}\n\
              {\"type\":\"TRACE\",\"trace\":{}}\n\
              {\"type\":\"CONTROL\",\"control\":{}}\n\
              {\"type\":\"RECORD\",\"record\":{}}\n",
        );

        let mut kinds = Vec::new();
        while let Some(message) = messages.next().await.unwrap() {
            kinds.push(message.kind());
        }

        assert_eq!(
            kinds,
            vec![MessageType::State, MessageType::Trace, MessageType::Control]
        );
        assert!(messages.is_exhausted());
    }

    #[tokio::test]
    async fn test_stays_exhausted() {
        let mut messages = filtered(b"{\"type\":\"STATE\",\"state\":{}}\n");

        assert!(messages.has_next().await.unwrap());
        assert!(messages.has_next().await.unwrap());
        assert!(messages.next().await.unwrap().is_some());
        assert!(!messages.has_next().await.unwrap());
        assert!(messages.next().await.unwrap().is_none());
        assert!(!messages.has_next().await.unwrap());
    }

    #[tokio::test]
    async fn test_skips_non_protocol_lines() {
        let mut messages = filtered(
            b"Starting destination...\n\
              \n\
              {\"unexpected\":true}\n\
              {\"type\":\"STATE\",\"state\":{}}\n",
        );

        let message = messages.next().await.unwrap().unwrap();
        assert_eq!(message.kind(), MessageType::State);
        assert!(messages.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_chatter_is_skipped() {
        let mut messages = filtered(
            b"connector chatter \xff\xfe\n\
              {\"type\":\"STATE\",\"state\":{}}\n",
        );

        let message = messages.next().await.unwrap().unwrap();
        assert_eq!(message.kind(), MessageType::State);
        assert!(messages.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_invalid_utf8() {
        let source = Builder::new().read(b"bad \xff bytes\n").build();
        let mut stream = JsonLinesMessageStream::new(source, true);

        let err = stream.next_message().await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_overlong_lines_are_skipped() {
        let source = Builder::new()
            .read(b"{\"type\":\"STATE\",\"state\":{\"padding\":\"")
            .read(&[b'x'; 64])
            .read(b"\"}}\n{\"type\":\"TRACE\",\"trace\":{}}\n")
            .build();
        let mut stream = JsonLinesMessageStream::new(source, false).with_max_line_bytes(40);

        let message = stream.next_message().await.unwrap().unwrap();
        assert_eq!(message.kind(), MessageType::Trace);
        assert!(stream.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_overlong_lines() {
        let source = Builder::new().read(&[b'x'; 64]).read(b"\n").build();
        let mut stream = JsonLinesMessageStream::new(source, true).with_max_line_bytes(16);

        let err = stream.next_message().await.unwrap_err();
        assert!(err.to_string().contains("exceeds 16 bytes"));
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_invalid_lines() {
        let source = Builder::new().read(b"not json\n").build();
        let mut stream = JsonLinesMessageStream::new(source, true);

        let err = stream.next_message().await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn test_read_failure_is_transport_error() {
        let source = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut stream = JsonLinesMessageStream::new(source, false);

        assert!(stream.next_message().await.unwrap_err().is_transport());
    }
}
