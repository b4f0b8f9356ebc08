//! Destination process adapter.
//!
//! Owns a destination connector process and mediates all communication with it:
//! messages go in through the connector's input stream, acknowledgements (STATE,
//! TRACE and CONTROL messages) come back out of its output stream, and its
//! diagnostics are relayed to the log in the background.
//!
//! Lifecycle:
//!
//! ```text
//! NotStarted --start--> Running --accept*--> Running --notify_end_of_input--> InputEnded --close--> Closed
//! ```
//!
//! `cancel` can be issued from any state, also from another task through a
//! [`DestinationCanceller`].

use crate::config::{DestinationConfig, ShutdownSettings};
use crate::io::log_drain::spawn_log_drain;
use crate::io::reader::{
    FilteredMessages, JsonLinesStreamFactory, MessageStreamFactory, ACCEPTED_MESSAGE_TYPES,
};
use crate::io::writer::{JsonLinesWriterFactory, MessageWriter, MessageWriterFactory};
use crate::launcher::{
    IntegrationLauncher, LaunchedProcess, LocalProcessLauncher, DESTINATION_CATALOG_JSON_FILENAME,
    DESTINATION_CONFIG_JSON_FILENAME,
};
use crate::shutdown::{cancel_process, gentle_close, ExitCodePolicy};
use crate::{
    ConnectorError, ConnectorProcess, ConnectorResult, DestinationMetrics, TimeoutMonitor,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tributary_common::{
    DestinationStartConfig, JsonProtocolSerializer, ProtocolMessage, ProtocolSerializer,
};

/// How long `close` waits for the diagnostic stream to drain after the process stopped
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type ProcessSlot = Arc<OnceLock<Box<dyn ConnectorProcess>>>;

/// Destination side of a sync, as seen by the sync loop
#[async_trait]
pub trait Destination: Send {
    /// Launch the connector. Must be called exactly once.
    async fn start(
        &mut self,
        config: &DestinationStartConfig,
        job_root: &Path,
    ) -> ConnectorResult<()>;

    /// Send one message to the connector
    async fn accept(&mut self, message: &ProtocolMessage) -> ConnectorResult<()>;

    /// Flush and close the connector's input
    async fn notify_end_of_input(&mut self) -> ConnectorResult<()>;

    /// Finish input if needed, stop the connector and check how it exited
    async fn close(&mut self) -> ConnectorResult<()>;

    /// Kill the connector immediately
    fn cancel(&self) -> ConnectorResult<()>;

    /// No more output and the process has exited. May wait for output.
    async fn is_finished(&mut self) -> ConnectorResult<bool>;

    /// Exit code of the connector, only available once it has exited
    fn exit_value(&self) -> ConnectorResult<i32>;

    /// Next STATE / TRACE / CONTROL message, `None` when the output is exhausted
    async fn attempt_read(&mut self) -> ConnectorResult<Option<ProtocolMessage>>;
}

/// Cancels a destination from outside the sync loop.
///
/// Obtained from [`DefaultDestination::canceller`]; may be taken before `start`.
#[derive(Clone)]
pub struct DestinationCanceller {
    process: ProcessSlot,
    metrics: DestinationMetrics,
}

impl DestinationCanceller {
    /// Force-kill the connector. A no-op if it was never started or already exited.
    pub fn cancel(&self) -> ConnectorResult<()> {
        info!("Attempting to cancel destination process...");

        match self.process.get() {
            None => info!("Destination process no longer exists, cancellation is a no-op."),
            Some(process) => {
                info!("Destination process exists, cancelling...");
                if cancel_process(process.as_ref())? {
                    self.metrics.record_cancel();
                    info!("Cancelled destination process!");
                } else {
                    info!("Destination process already exited, nothing to cancel.");
                }
            }
        }
        Ok(())
    }
}

/// [`Destination`] backed by an externally launched connector process
pub struct DefaultDestination {
    launcher: Arc<dyn IntegrationLauncher>,
    stream_factory: Arc<dyn MessageStreamFactory>,
    writer_factory: Arc<dyn MessageWriterFactory>,
    serializer: Arc<dyn ProtocolSerializer>,
    timeout_monitor: Arc<dyn TimeoutMonitor>,

    connector_name: String,
    grace_period: Duration,
    last_chance: Duration,
    exit_policy: ExitCodePolicy,
    metrics: DestinationMetrics,

    process: ProcessSlot,
    input_has_ended: AtomicBool,
    writer: Option<Box<dyn MessageWriter>>,
    messages: Option<FilteredMessages>,
    log_drain: Option<JoinHandle<usize>>,
    exit_value: OnceLock<i32>,
}

impl DefaultDestination {
    /// Create a destination with the default JSON-lines reader and writer
    pub fn new(
        launcher: Arc<dyn IntegrationLauncher>,
        timeout_monitor: Arc<dyn TimeoutMonitor>,
    ) -> Self {
        let shutdown = ShutdownSettings::default();
        let connector_name = "destination".to_string();

        Self {
            launcher,
            stream_factory: Arc::new(JsonLinesStreamFactory::default()),
            writer_factory: Arc::new(JsonLinesWriterFactory),
            serializer: Arc::new(JsonProtocolSerializer),
            timeout_monitor,
            metrics: DestinationMetrics::new(&connector_name),
            connector_name,
            grace_period: shutdown.grace_period(),
            last_chance: shutdown.last_chance(),
            exit_policy: ExitCodePolicy::new(shutdown.accepted_exit_codes),
            process: Arc::new(OnceLock::new()),
            input_has_ended: AtomicBool::new(false),
            writer: None,
            messages: None,
            log_drain: None,
            exit_value: OnceLock::new(),
        }
    }

    /// Create a destination running a local connector process as configured
    pub fn from_config(
        config: &DestinationConfig,
        timeout_monitor: Arc<dyn TimeoutMonitor>,
    ) -> ConnectorResult<Self> {
        config.validate()?;
        let launcher = LocalProcessLauncher::new(config.launcher.clone())?;

        Ok(Self::new(Arc::new(launcher), timeout_monitor)
            .with_connector_name(&config.connector_name)
            .with_shutdown_settings(&config.shutdown)
            .with_stream_factory(Arc::new(
                JsonLinesStreamFactory::new(config.reader.fail_on_invalid_line)
                    .with_max_line_bytes(config.reader.max_line_bytes),
            )))
    }

    pub fn with_connector_name(mut self, name: &str) -> Self {
        self.connector_name = name.to_string();
        self.metrics = DestinationMetrics::new(name);
        self
    }

    pub fn with_shutdown_settings(mut self, shutdown: &ShutdownSettings) -> Self {
        self.grace_period = shutdown.grace_period();
        self.last_chance = shutdown.last_chance();
        self.exit_policy = ExitCodePolicy::new(shutdown.accepted_exit_codes.clone());
        self
    }

    pub fn with_stream_factory(mut self, factory: Arc<dyn MessageStreamFactory>) -> Self {
        self.stream_factory = factory;
        self
    }

    pub fn with_writer_factory(mut self, factory: Arc<dyn MessageWriterFactory>) -> Self {
        self.writer_factory = factory;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ProtocolSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Handle for cancelling this destination from another task
    pub fn canceller(&self) -> DestinationCanceller {
        DestinationCanceller {
            process: Arc::clone(&self.process),
            metrics: self.metrics.clone(),
        }
    }

    /// Whether `notify_end_of_input` has completed
    pub fn input_has_ended(&self) -> bool {
        self.input_has_ended.load(Ordering::SeqCst)
    }

    /// `accept` without the timeout monitor hooks
    pub async fn accept_with_no_timeout_monitor(
        &mut self,
        message: &ProtocolMessage,
    ) -> ConnectorResult<()> {
        let writer = self.open_writer()?;

        let started = Instant::now();
        writer.write(message).await?;
        self.metrics.record_written(started.elapsed());
        Ok(())
    }

    /// `notify_end_of_input` without the timeout monitor hooks
    pub async fn notify_end_of_input_with_no_timeout_monitor(&mut self) -> ConnectorResult<()> {
        let writer = self.open_writer()?;

        writer.flush().await?;
        writer.close().await?;
        self.input_has_ended.store(true, Ordering::SeqCst);
        debug!("Destination input closed");
        Ok(())
    }

    fn open_writer(&mut self) -> ConnectorResult<&mut Box<dyn MessageWriter>> {
        if self.process.get().is_none() {
            return Err(ConnectorError::state("Destination process has not been started"));
        }
        if self.input_has_ended.load(Ordering::SeqCst) {
            return Err(ConnectorError::state("Destination input has already ended"));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| ConnectorError::state("Destination writer is not initialized"))
    }

    fn started_process(&self) -> ConnectorResult<&dyn ConnectorProcess> {
        self.process
            .get()
            .map(|p| p.as_ref())
            .ok_or_else(|| ConnectorError::state("Destination process has not been started"))
    }

    async fn finish_log_drain(&mut self) {
        let Some(mut handle) = self.log_drain.take() else {
            return;
        };

        match tokio::time::timeout(LOG_DRAIN_TIMEOUT, &mut handle).await {
            Ok(Ok(lines)) => debug!("Relayed {} destination log lines", lines),
            Ok(Err(e)) => warn!("Destination log drain failed: {}", e),
            Err(_) => {
                warn!("Destination diagnostics still open after exit, detaching log drain");
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Destination for DefaultDestination {
    async fn start(
        &mut self,
        config: &DestinationStartConfig,
        job_root: &Path,
    ) -> ConnectorResult<()> {
        if self.process.get().is_some() {
            return Err(ConnectorError::state(
                "Destination process has already been started",
            ));
        }

        info!("Running destination...");
        let config_contents = serde_json::to_string(&config.connection_configuration)
            .map_err(|e| ConnectorError::Serialization(e.to_string()))?;
        let catalog_contents = self.serializer.serialize(&config.catalog)?;

        let LaunchedProcess {
            process,
            stdin,
            stdout,
            stderr,
        } = self
            .launcher
            .launch(
                job_root,
                DESTINATION_CONFIG_JSON_FILENAME,
                &config_contents,
                DESTINATION_CATALOG_JSON_FILENAME,
                &catalog_contents,
            )
            .await?;

        // stdout carries protocol data, only stderr goes to the log
        self.log_drain = Some(spawn_log_drain(stderr, self.connector_name.clone()));
        self.writer = Some(self.writer_factory.create_writer(stdin));
        self.messages = Some(
            FilteredMessages::new(self.stream_factory.create(stdout), &ACCEPTED_MESSAGE_TYPES)
                .with_metrics(self.metrics.clone()),
        );

        if self.process.set(process).is_err() {
            return Err(ConnectorError::state(
                "Destination process has already been started",
            ));
        }
        self.metrics.set_running(true);
        Ok(())
    }

    async fn accept(&mut self, message: &ProtocolMessage) -> ConnectorResult<()> {
        self.timeout_monitor.start_accept_timer();
        let result = self.accept_with_no_timeout_monitor(message).await;
        self.timeout_monitor.reset_accept_timer();
        result
    }

    async fn notify_end_of_input(&mut self) -> ConnectorResult<()> {
        self.timeout_monitor.start_notify_end_of_input_timer();
        let result = self.notify_end_of_input_with_no_timeout_monitor().await;
        self.timeout_monitor.reset_notify_end_of_input_timer();
        result
    }

    async fn close(&mut self) -> ConnectorResult<()> {
        let slot = Arc::clone(&self.process);
        let Some(process) = slot.get() else {
            debug!("Destination process already exited");
            return Ok(());
        };

        if !self.input_has_ended.load(Ordering::SeqCst) {
            self.notify_end_of_input().await?;
        }

        debug!("Closing destination process");
        gentle_close(process.as_ref(), self.grace_period, self.last_chance).await;
        self.finish_log_drain().await;

        let still_alive = process.is_alive();
        let exit_code = if still_alive {
            None
        } else {
            Some(self.exit_value()?)
        };

        self.metrics.set_running(still_alive);
        if let Some(code) = exit_code {
            self.metrics.record_exit_code(code);
        }
        self.exit_policy.classify(still_alive, exit_code)
    }

    fn cancel(&self) -> ConnectorResult<()> {
        self.canceller().cancel()
    }

    async fn is_finished(&mut self) -> ConnectorResult<bool> {
        let process = self
            .process
            .get()
            .ok_or_else(|| ConnectorError::state("Destination process has not been started"))?;
        let messages = self
            .messages
            .as_mut()
            .ok_or_else(|| ConnectorError::state("Destination reader is not initialized"))?;

        // Runs on every read iteration: only ask the OS once the output is drained
        Ok(!messages.has_next().await? && !process.is_alive())
    }

    fn exit_value(&self) -> ConnectorResult<i32> {
        let process = self.process.get().ok_or_else(|| {
            ConnectorError::state("Destination process is null, cannot retrieve exit value.")
        })?;
        if process.is_alive() {
            return Err(ConnectorError::state(
                "Destination process is still alive, cannot retrieve exit value.",
            ));
        }

        if let Some(code) = self.exit_value.get() {
            return Ok(*code);
        }
        let code = process.exit_code().ok_or_else(|| {
            ConnectorError::state("Destination process exited without an exit value")
        })?;
        Ok(*self.exit_value.get_or_init(|| code))
    }

    async fn attempt_read(&mut self) -> ConnectorResult<Option<ProtocolMessage>> {
        self.started_process()?;
        let messages = self
            .messages
            .as_mut()
            .ok_or_else(|| ConnectorError::state("Destination reader is not initialized"))?;

        messages.next().await
    }
}
