//! Error types for the destination adapter.

use std::time::Duration;
use tributary_common::ProtocolError;

/// Result alias used throughout the crate
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

/// Errors surfaced by the destination adapter and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// An operation was called out of sequence. This is a bug in the calling sync loop.
    #[error("Illegal state: {0}")]
    State(String),

    /// The connector process could not be launched
    #[error("Destination setup failed: {message}")]
    Setup {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport failure on one of the connector's standard streams
    #[error("{message}: {source}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The connector did not stop cleanly
    #[error("{}", abnormal_exit_message(*still_alive, *exit_code))]
    AbnormalExit {
        still_alive: bool,
        exit_code: Option<i32>,
    },

    /// The connector process could not be killed
    #[error("Failed to cancel destination process: {source}")]
    Cancel {
        #[source]
        source: std::io::Error,
    },

    /// A bracketed call ran longer than its threshold
    #[error("{operation} has been running for {elapsed:?}, exceeding the {threshold:?} timeout")]
    Timeout {
        operation: String,
        elapsed: Duration,
        threshold: Duration,
    },

    /// The connector emitted a malformed protocol line
    #[error("Invalid data from destination: {message}")]
    InvalidData { message: String, line: String },

    /// A message or startup artifact could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

fn abnormal_exit_message(still_alive: bool, exit_code: Option<i32>) -> String {
    let message = match (still_alive, exit_code) {
        (true, _) | (false, None) => "Destination has not terminated".to_string(),
        (false, Some(code)) => format!("Destination process exit with code {}", code),
    };
    format!("{}. This warning is normal if the job was cancelled.", message)
}

impl ConnectorError {
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
            source: None,
        }
    }

    pub fn setup_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Setup {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Process still running after the shutdown sequence
    pub fn still_running() -> Self {
        Self::AbnormalExit {
            still_alive: true,
            exit_code: None,
        }
    }

    /// Process exited with a code outside the accepted set
    pub fn exited_with(code: i32) -> Self {
        Self::AbnormalExit {
            still_alive: false,
            exit_code: Some(code),
        }
    }

    /// Out-of-sequence call made by the caller
    pub fn is_state_violation(&self) -> bool {
        matches!(self, ConnectorError::State(_))
    }

    /// Failure on the process's standard streams
    pub fn is_transport(&self) -> bool {
        matches!(self, ConnectorError::Io { .. })
    }

    /// Connector terminated abnormally (or did not terminate)
    pub fn is_abnormal_exit(&self) -> bool {
        matches!(self, ConnectorError::AbnormalExit { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectorError::Timeout { .. })
    }
}

impl From<ProtocolError> for ConnectorError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Serialize(e) => ConnectorError::Serialization(e.to_string()),
            ProtocolError::InvalidMessage { reason, line } => ConnectorError::InvalidData {
                message: reason,
                line,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abnormal_exit_messages() {
        let alive = ConnectorError::still_running().to_string();
        assert_eq!(
            alive,
            "Destination has not terminated. This warning is normal if the job was cancelled."
        );

        let exited = ConnectorError::exited_with(1).to_string();
        assert_eq!(
            exited,
            "Destination process exit with code 1. This warning is normal if the job was cancelled."
        );
    }

    #[test]
    fn test_predicates() {
        assert!(ConnectorError::state("x").is_state_violation());
        assert!(ConnectorError::io("write", std::io::Error::other("boom")).is_transport());
        assert!(ConnectorError::exited_with(2).is_abnormal_exit());
        assert!(!ConnectorError::config("x").is_state_violation());
    }
}
