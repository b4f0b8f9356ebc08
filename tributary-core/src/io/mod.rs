//! Channel adapters over the connector's standard streams.
//!
//! - [`writer`]: one serialized protocol message per line into the connector's input
//! - [`reader`]: lazy, filtered sequence of protocol messages from the connector's output
//! - [`log_drain`]: relays the connector's diagnostic stream to the log

pub mod log_drain;
pub mod reader;
pub mod writer;

use tokio::io::{AsyncRead, AsyncWrite};

/// Type-erased input stream of a connector
pub type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Type-erased output or diagnostic stream of a connector
pub type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
