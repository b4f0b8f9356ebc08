//! Message writer over the connector's input stream.

use super::BoxedWrite;
use crate::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tributary_common::ProtocolMessage;

/// Serializes protocol messages into a connector's input stream
#[async_trait]
pub trait MessageWriter: Send {
    /// Write one message as a single line
    async fn write(&mut self, message: &ProtocolMessage) -> ConnectorResult<()>;

    /// Push buffered lines to the connector
    async fn flush(&mut self) -> ConnectorResult<()>;

    /// Flush and close the stream, signalling end of input. Only valid once.
    async fn close(&mut self) -> ConnectorResult<()>;
}

/// Creates a [`MessageWriter`] over a connector's input stream
pub trait MessageWriterFactory: Send + Sync {
    fn create_writer(&self, sink: BoxedWrite) -> Box<dyn MessageWriter>;
}

/// Buffered JSON-lines writer
pub struct JsonLinesWriter<W = BoxedWrite> {
    inner: Option<BufWriter<W>>,
}

impl<W: AsyncWrite + Send + Unpin> JsonLinesWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            inner: Some(BufWriter::new(sink)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn open(&mut self) -> ConnectorResult<&mut BufWriter<W>> {
        self.inner
            .as_mut()
            .ok_or_else(|| ConnectorError::state("Message writer is already closed"))
    }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin> MessageWriter for JsonLinesWriter<W> {
    async fn write(&mut self, message: &ProtocolMessage) -> ConnectorResult<()> {
        let mut line = message.to_json_line()?.into_bytes();
        line.push(b'\n');

        self.open()?
            .write_all(&line)
            .await
            .map_err(|e| ConnectorError::io("Failed to write message to destination", e))
    }

    async fn flush(&mut self) -> ConnectorResult<()> {
        self.open()?
            .flush()
            .await
            .map_err(|e| ConnectorError::io("Failed to flush destination input", e))
    }

    async fn close(&mut self) -> ConnectorResult<()> {
        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| ConnectorError::state("Message writer is already closed"))?;

        // shutdown() flushes the buffer before closing the pipe
        inner
            .shutdown()
            .await
            .map_err(|e| ConnectorError::io("Failed to close destination input", e))
    }
}

/// Factory for [`JsonLinesWriter`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesWriterFactory;

impl MessageWriterFactory for JsonLinesWriterFactory {
    fn create_writer(&self, sink: BoxedWrite) -> Box<dyn MessageWriter> {
        Box::new(JsonLinesWriter::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_writes_one_line_per_message() {
        let mock = Builder::new()
            .write(b"{\"type\":\"STATE\",\"state\":{\"n\":1}}\n{\"type\":\"STATE\",\"state\":{\"n\":2}}\n")
            .build();
        let mut writer = JsonLinesWriter::new(mock);

        writer
            .write(&ProtocolMessage::state(json!({"n": 1})))
            .await
            .unwrap();
        writer
            .write(&ProtocolMessage::state(json!({"n": 2})))
            .await
            .unwrap();
        writer.flush().await.unwrap();
        writer.close().await.unwrap();

        assert!(writer.is_closed());
    }

    #[tokio::test]
    async fn test_write_after_close_is_state_error() {
        let mut writer = JsonLinesWriter::new(Builder::new().build());
        writer.close().await.unwrap();

        let err = writer
            .write(&ProtocolMessage::record(json!({})))
            .await
            .unwrap_err();
        assert!(err.is_state_violation());
        assert!(writer.close().await.unwrap_err().is_state_violation());
    }

    #[tokio::test]
    async fn test_broken_pipe_is_transport_error() {
        let mock = Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            ))
            .build();
        let mut writer = JsonLinesWriter::new(mock);

        writer
            .write(&ProtocolMessage::state(json!({})))
            .await
            .unwrap();
        let err = writer.flush().await.unwrap_err();
        assert!(err.is_transport());
    }
}
