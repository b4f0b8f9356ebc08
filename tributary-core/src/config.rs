//! Configuration management for the destination adapter.

use crate::io::reader::DEFAULT_MAX_LINE_BYTES;
use crate::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Exit codes that do not indicate a failure: normal exit and SIGTERM (128 + 15)
pub const DEFAULT_ACCEPTED_EXIT_CODES: [i32; 2] = [0, 143];

/// Main configuration for a destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Connector name, used in logs and metric labels
    #[serde(default = "default_connector_name")]
    pub connector_name: String,

    /// How the connector process is started
    #[serde(default)]
    pub launcher: LauncherSettings,

    /// Graceful shutdown and exit-code policy
    #[serde(default)]
    pub shutdown: ShutdownSettings,

    /// Thresholds for the destination timeout monitor
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Output stream parsing
    #[serde(default)]
    pub reader: ReaderSettings,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Command used to start the connector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherSettings {
    /// Program to execute
    #[serde(default)]
    pub command: String,

    /// Arguments placed before the protocol arguments (`write --config .. --catalog ..`)
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the connector process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownSettings {
    /// Time the connector gets to exit on its own after end of input
    #[serde(default = "default_one_minute_ms")]
    pub grace_period_ms: u64,

    /// Time the connector gets to exit after the polite termination request
    #[serde(default = "default_one_minute_ms")]
    pub last_chance_ms: u64,

    /// Exit codes treated as a clean shutdown
    #[serde(default = "default_accepted_exit_codes")]
    pub accepted_exit_codes: Vec<i32>,
}

impl ShutdownSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn last_chance(&self) -> Duration {
        Duration::from_millis(self.last_chance_ms)
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: default_one_minute_ms(),
            last_chance_ms: default_one_minute_ms(),
            accepted_exit_codes: default_accepted_exit_codes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Maximum duration of a single accept call
    #[serde(default = "default_one_day_ms")]
    pub accept_timeout_ms: u64,

    /// Maximum duration of the end-of-input call
    #[serde(default = "default_one_day_ms")]
    pub notify_end_of_input_timeout_ms: u64,

    /// How often the watchdog inspects in-flight calls
    #[serde(default = "default_one_minute_ms")]
    pub check_interval_ms: u64,

    /// Fail the sync when a timeout is detected, otherwise only warn
    #[serde(default = "default_true")]
    pub fail_on_timeout: bool,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            accept_timeout_ms: default_one_day_ms(),
            notify_end_of_input_timeout_ms: default_one_day_ms(),
            check_interval_ms: default_one_minute_ms(),
            fail_on_timeout: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderSettings {
    /// Fail the read path on malformed lines instead of logging and skipping them
    #[serde(default)]
    pub fail_on_invalid_line: bool,

    /// Longest output line kept; longer lines are treated as malformed
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            fail_on_invalid_line: false,
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

fn default_connector_name() -> String {
    "destination".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_one_minute_ms() -> u64 {
    60_000
}

fn default_one_day_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_accepted_exit_codes() -> Vec<i32> {
    DEFAULT_ACCEPTED_EXIT_CODES.to_vec()
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

fn default_true() -> bool {
    true
}

impl DestinationConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CONNECTOR_NAME`: Connector name (default: destination)
    /// - `DESTINATION_COMMAND`: Program implementing the destination
    /// - `DESTINATION_ARGS`: Whitespace separated arguments placed before the protocol arguments
    /// - `GRACE_PERIOD_MS`: Voluntary exit window after end of input (default: 60000)
    /// - `LAST_CHANCE_MS`: Exit window after SIGTERM (default: 60000)
    /// - `ACCEPTED_EXIT_CODES`: Comma separated list (default: 0,143)
    /// - `ACCEPT_TIMEOUT_MS`: Accept call timeout (default: 24h)
    /// - `NOTIFY_END_OF_INPUT_TIMEOUT_MS`: End-of-input call timeout (default: 24h)
    /// - `TIMEOUT_CHECK_INTERVAL_MS`: Watchdog interval (default: 60000)
    /// - `FAIL_ON_TIMEOUT`: Fail the sync on timeout (default: true)
    /// - `FAIL_ON_INVALID_LINE`: Strict output parsing (default: false)
    /// - `MAX_LINE_BYTES`: Longest accepted output line (default: 64 MiB)
    /// - `LOG_LEVEL`: Log level (default: info)
    pub fn from_env() -> ConnectorResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        Self::from_toml_str(&content).map_err(|e| {
            ConnectorError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply environment variable overrides on top of the current values
    pub fn apply_env_overrides(&mut self) -> ConnectorResult<()> {
        if let Ok(val) = env::var("CONNECTOR_NAME") {
            self.connector_name = val;
        }
        if let Ok(val) = env::var("DESTINATION_COMMAND") {
            self.launcher.command = val;
        }
        if let Ok(val) = env::var("DESTINATION_ARGS") {
            self.launcher.args = val.split_whitespace().map(str::to_string).collect();
        }
        if let Some(n) = parse_env("GRACE_PERIOD_MS")? {
            self.shutdown.grace_period_ms = n;
        }
        if let Some(n) = parse_env("LAST_CHANCE_MS")? {
            self.shutdown.last_chance_ms = n;
        }
        if let Ok(val) = env::var("ACCEPTED_EXIT_CODES") {
            self.shutdown.accepted_exit_codes = parse_exit_codes(&val)?;
        }
        if let Some(n) = parse_env("ACCEPT_TIMEOUT_MS")? {
            self.timeouts.accept_timeout_ms = n;
        }
        if let Some(n) = parse_env("NOTIFY_END_OF_INPUT_TIMEOUT_MS")? {
            self.timeouts.notify_end_of_input_timeout_ms = n;
        }
        if let Some(n) = parse_env("TIMEOUT_CHECK_INTERVAL_MS")? {
            self.timeouts.check_interval_ms = n;
        }
        if let Some(b) = parse_env("FAIL_ON_TIMEOUT")? {
            self.timeouts.fail_on_timeout = b;
        }
        if let Some(b) = parse_env("FAIL_ON_INVALID_LINE")? {
            self.reader.fail_on_invalid_line = b;
        }
        if let Some(n) = parse_env("MAX_LINE_BYTES")? {
            self.reader.max_line_bytes = n;
        }
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.log_level = val;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.connector_name.is_empty() {
            return Err(ConnectorError::config("connector_name cannot be empty"));
        }

        if self.shutdown.grace_period_ms == 0 {
            return Err(ConnectorError::config("shutdown.grace_period_ms must be > 0"));
        }

        if self.shutdown.accepted_exit_codes.is_empty() {
            return Err(ConnectorError::config(
                "shutdown.accepted_exit_codes cannot be empty",
            ));
        }

        if self.timeouts.check_interval_ms == 0 {
            return Err(ConnectorError::config("timeouts.check_interval_ms must be > 0"));
        }

        if self.reader.max_line_bytes == 0 {
            return Err(ConnectorError::config("reader.max_line_bytes must be > 0"));
        }

        Ok(())
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            connector_name: default_connector_name(),
            launcher: LauncherSettings::default(),
            shutdown: ShutdownSettings::default(),
            timeouts: TimeoutSettings::default(),
            reader: ReaderSettings::default(),
            log_level: default_log_level(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> ConnectorResult<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConnectorError::config(format!("{} has an invalid value: {}", name, val))),
        Err(_) => Ok(None),
    }
}

fn parse_exit_codes(value: &str) -> ConnectorResult<Vec<i32>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| ConnectorError::config(format!("Invalid exit code: {}", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DestinationConfig::default();
        assert_eq!(config.connector_name, "destination");
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(60));
        assert_eq!(config.shutdown.accepted_exit_codes, vec![0, 143]);
        assert!(config.timeouts.fail_on_timeout);
        assert!(!config.reader.fail_on_invalid_line);
        assert_eq!(config.reader.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DestinationConfig::default();
        assert!(config.validate().is_ok());

        config.shutdown.accepted_exit_codes.clear();
        assert!(config.validate().is_err());

        config.shutdown.accepted_exit_codes = vec![0];
        config.shutdown.grace_period_ms = 0;
        assert!(config.validate().is_err());

        config.shutdown.grace_period_ms = 1000;
        config.reader.max_line_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let config = DestinationConfig::from_toml_str(
            r#"
            connector_name = "dest-postgres"

            [launcher]
            command = "/usr/local/bin/destination-postgres"
            args = ["--verbose"]

            [shutdown]
            grace_period_ms = 5000
            accepted_exit_codes = [0, 130, 143]
            "#,
        )
        .unwrap();

        assert_eq!(config.connector_name, "dest-postgres");
        assert_eq!(config.launcher.args, vec!["--verbose".to_string()]);
        assert_eq!(config.shutdown.grace_period_ms, 5000);
        assert_eq!(config.shutdown.last_chance_ms, 60_000);
        assert_eq!(config.shutdown.accepted_exit_codes, vec![0, 130, 143]);
        assert_eq!(config.timeouts.check_interval_ms, 60_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_exit_codes() {
        assert_eq!(parse_exit_codes("0, 143,").unwrap(), vec![0, 143]);
        assert!(parse_exit_codes("0,abc").is_err());
    }
}
