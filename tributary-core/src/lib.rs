//! # Tributary Core
//!
//! Destination process adapter for the Tributary sync worker.
//!
//! A destination connector is a standalone program that receives protocol messages on
//! stdin, one JSON object per line, and answers on stdout with the messages the sync
//! loop cares about: STATE checkpoints, TRACE events and CONTROL messages. Anything it
//! writes to stderr is relayed to the log.
//!
//! This crate owns that process for the duration of a sync: it launches it with the
//! startup artifacts, feeds it, reads from it, shuts it down and decides whether the
//! way it exited counts as a failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tributary_core::{
//!     DefaultDestination, Destination, DestinationConfig, DestinationTimeoutMonitor,
//!     ConnectorResult,
//! };
//! use tributary_common::{ConfiguredCatalog, DestinationStartConfig, ProtocolMessage};
//!
//! # async fn run() -> ConnectorResult<()> {
//! let config = DestinationConfig::from_env()?;
//! let monitor = Arc::new(DestinationTimeoutMonitor::new(&config.timeouts)?);
//! let mut destination = DefaultDestination::from_config(&config, monitor)?;
//!
//! let start = DestinationStartConfig::new(serde_json::json!({}), ConfiguredCatalog::default());
//! destination.start(&start, Path::new("/tmp/job")).await?;
//! destination.accept(&ProtocolMessage::state(serde_json::json!({}))).await?;
//! destination.notify_end_of_input().await?;
//!
//! while let Some(message) = destination.attempt_read().await? {
//!     println!("{}", message.kind());
//! }
//! destination.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Lifecycle enforcement**: misuse such as starting twice or writing after end of input is rejected
//! - **Graceful shutdown**: grace period, termination request, then force kill
//! - **Exit-code policy**: 0 and 143 count as success by default, configurable
//! - **Cancellation**: from any task through a [`DestinationCanceller`]
//! - **Observability**: metrics, structured logging and timeout monitoring

mod config;
mod destination;
mod error;
mod io;
mod launcher;
mod logging;
mod metrics;
mod process;
mod shutdown;
mod timeout;

// Re-export public API
pub use config::{
    DestinationConfig, LauncherSettings, ReaderSettings, ShutdownSettings, TimeoutSettings,
    DEFAULT_ACCEPTED_EXIT_CODES,
};
pub use destination::{DefaultDestination, Destination, DestinationCanceller};
pub use error::{ConnectorError, ConnectorResult};
pub use io::log_drain::spawn_log_drain;
pub use io::reader::{
    FilteredMessages, JsonLinesMessageStream, JsonLinesStreamFactory, MessageStream,
    MessageStreamFactory, ACCEPTED_MESSAGE_TYPES, DEFAULT_MAX_LINE_BYTES,
};
pub use io::writer::{JsonLinesWriter, JsonLinesWriterFactory, MessageWriter, MessageWriterFactory};
pub use io::{BoxedRead, BoxedWrite};
pub use launcher::{
    IntegrationLauncher, LaunchedProcess, LocalProcessLauncher, DESTINATION_CATALOG_JSON_FILENAME,
    DESTINATION_CONFIG_JSON_FILENAME,
};
pub use logging::init_tracing;
pub use metrics::DestinationMetrics;
pub use process::{exit_code_of, ConnectorProcess, LocalConnectorProcess};
pub use shutdown::{cancel_process, gentle_close, wait_for_exit, ExitCodePolicy};
pub use timeout::{DestinationTimeoutMonitor, NoopTimeoutMonitor, TimeoutMonitor};

// Re-export the protocol model
pub use tributary_common::{
    ConfiguredCatalog, DestinationStartConfig, MessageType, ProtocolMessage, ProtocolSerializer,
};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
