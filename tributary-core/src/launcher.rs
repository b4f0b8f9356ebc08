//! Starting connector processes.
//!
//! A launcher materializes the startup artifacts (connection configuration and
//! catalog) in the job's working directory and starts the connector with piped
//! standard streams.

use crate::config::LauncherSettings;
use crate::io::{BoxedRead, BoxedWrite};
use crate::{ConnectorError, ConnectorProcess, ConnectorResult, LocalConnectorProcess};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// File name of the destination connection configuration inside the job root
pub const DESTINATION_CONFIG_JSON_FILENAME: &str = "destination_config.json";

/// File name of the destination catalog inside the job root
pub const DESTINATION_CATALOG_JSON_FILENAME: &str = "destination_catalog.json";

/// A started connector: lifecycle handle plus its three standard streams
pub struct LaunchedProcess {
    pub process: Box<dyn ConnectorProcess>,
    /// Connector's input stream
    pub stdin: BoxedWrite,
    /// Connector's protocol output
    pub stdout: BoxedRead,
    /// Connector's diagnostics
    pub stderr: BoxedRead,
}

/// Starts a connector given its startup artifacts
#[async_trait]
pub trait IntegrationLauncher: Send + Sync {
    /// Write both artifacts into `job_root` and start the connector
    async fn launch(
        &self,
        job_root: &Path,
        config_filename: &str,
        config_contents: &str,
        catalog_filename: &str,
        catalog_contents: &str,
    ) -> ConnectorResult<LaunchedProcess>;
}

/// Launches the connector as a local child process.
///
/// The command line is `<command> <args..> write --config <file> --catalog <file>`,
/// run with the job root as working directory.
#[derive(Debug, Clone)]
pub struct LocalProcessLauncher {
    settings: LauncherSettings,
}

impl LocalProcessLauncher {
    pub fn new(settings: LauncherSettings) -> ConnectorResult<Self> {
        if settings.command.is_empty() {
            return Err(ConnectorError::config("launcher.command cannot be empty"));
        }
        Ok(Self { settings })
    }

    async fn write_artifact(path: &Path, contents: &str) -> ConnectorResult<()> {
        tokio::fs::write(path, contents).await.map_err(|e| {
            ConnectorError::setup_with_source(format!("Failed to write {}", path.display()), e)
        })
    }
}

#[async_trait]
impl IntegrationLauncher for LocalProcessLauncher {
    async fn launch(
        &self,
        job_root: &Path,
        config_filename: &str,
        config_contents: &str,
        catalog_filename: &str,
        catalog_contents: &str,
    ) -> ConnectorResult<LaunchedProcess> {
        tokio::fs::create_dir_all(job_root).await.map_err(|e| {
            ConnectorError::setup_with_source(
                format!("Failed to create job root {}", job_root.display()),
                e,
            )
        })?;

        let config_path = job_root.join(config_filename);
        let catalog_path = job_root.join(catalog_filename);
        Self::write_artifact(&config_path, config_contents).await?;
        Self::write_artifact(&catalog_path, catalog_contents).await?;
        debug!(
            "Wrote startup artifacts {} and {}",
            config_path.display(),
            catalog_path.display()
        );

        let mut command = Command::new(&self.settings.command);
        command
            .args(&self.settings.args)
            .arg("write")
            .arg("--config")
            .arg(&config_path)
            .arg("--catalog")
            .arg(&catalog_path)
            .envs(&self.settings.env)
            .current_dir(job_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            ConnectorError::setup_with_source(
                format!("Failed to start {}", self.settings.command),
                e,
            )
        })?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        info!(
            "Started destination {} (pid {:?})",
            self.settings.command,
            child.id()
        );

        Ok(LaunchedProcess {
            process: Box::new(LocalConnectorProcess::new(child)),
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }
}

fn missing_pipe(name: &str) -> ConnectorError {
    ConnectorError::setup_with_source(
        format!("Destination {} unavailable", name),
        io::Error::other(format!("{} was not piped", name)),
    )
}
