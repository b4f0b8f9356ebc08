//! Common protocol types for Tributary connectors.
//!
//! This crate provides the data model shared between the sync worker and the
//! connector processes it drives:
//! - Line protocol messages ([`ProtocolMessage`], [`MessageType`])
//! - The configured catalog handed to destinations at startup
//! - Serialization helpers for startup artifacts

mod catalog;
mod protocol;
mod serialization;

pub use catalog::{
    ConfiguredCatalog, ConfiguredStream, DestinationStartConfig, DestinationSyncMode,
    StreamDescriptor, SyncMode,
};
pub use protocol::{MessageType, ProtocolMessage};
pub use serialization::{JsonProtocolSerializer, ProtocolSerializer};

/// Errors raised while encoding or decoding protocol data
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Failed to serialize protocol data: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid protocol message ({reason}): {line}")]
    InvalidMessage { reason: String, line: String },
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
