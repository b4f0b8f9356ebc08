//! Configured catalog handed to destination connectors at startup.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a stream is read from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

/// How a stream is written into the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSyncMode {
    Append,
    Overwrite,
    AppendDedup,
}

/// Stream identity and schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub json_schema: Value,
}

/// A stream selected for replication together with its sync settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredStream {
    pub stream: StreamDescriptor,
    pub sync_mode: SyncMode,
    pub destination_sync_mode: DestinationSyncMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cursor_field: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<Vec<String>>,
}

impl ConfiguredStream {
    /// Full-refresh / append stream with the given name and schema
    pub fn new(name: impl Into<String>, json_schema: Value) -> Self {
        Self {
            stream: StreamDescriptor {
                name: name.into(),
                namespace: None,
                json_schema,
            },
            sync_mode: SyncMode::FullRefresh,
            destination_sync_mode: DestinationSyncMode::Append,
            cursor_field: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.stream.namespace = Some(namespace.into());
        self
    }

    pub fn with_sync_modes(mut self, sync: SyncMode, destination: DestinationSyncMode) -> Self {
        self.sync_mode = sync;
        self.destination_sync_mode = destination;
        self
    }

    pub fn with_cursor_field(mut self, cursor: Vec<String>) -> Self {
        self.cursor_field = cursor;
        self
    }

    pub fn with_primary_key(mut self, key: Vec<Vec<String>>) -> Self {
        self.primary_key = key;
        self
    }
}

/// Set of streams a destination should expect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredCatalog {
    pub streams: Vec<ConfiguredStream>,
}

impl ConfiguredCatalog {
    pub fn new(streams: Vec<ConfiguredStream>) -> Self {
        Self { streams }
    }

    /// Look up a stream by name and namespace
    pub fn find(&self, name: &str, namespace: Option<&str>) -> Option<&ConfiguredStream> {
        self.streams
            .iter()
            .find(|s| s.stream.name == name && s.stream.namespace.as_deref() == namespace)
    }
}

/// Everything a destination connector needs at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationStartConfig {
    /// Connector-specific connection settings (credentials, endpoints, ...)
    pub connection_configuration: Value,
    /// Streams that will be written
    pub catalog: ConfiguredCatalog,
}

impl DestinationStartConfig {
    pub fn new(connection_configuration: Value, catalog: ConfiguredCatalog) -> Self {
        Self {
            connection_configuration,
            catalog,
        }
    }
}
