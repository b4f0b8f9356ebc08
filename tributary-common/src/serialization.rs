//! Serialization of startup artifacts handed to connectors.

use crate::{ConfiguredCatalog, ProtocolError, ProtocolResult};

/// Turns an in-memory catalog into the text written to the connector's job directory
pub trait ProtocolSerializer: Send + Sync {
    fn serialize(&self, catalog: &ConfiguredCatalog) -> ProtocolResult<String>;
}

/// Plain JSON serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProtocolSerializer;

impl ProtocolSerializer for JsonProtocolSerializer {
    fn serialize(&self, catalog: &ConfiguredCatalog) -> ProtocolResult<String> {
        serde_json::to_string(catalog).map_err(ProtocolError::Serialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfiguredStream;
    use serde_json::json;

    #[test]
    fn test_serialize_catalog() {
        let catalog = ConfiguredCatalog::new(vec![ConfiguredStream::new(
            "orders",
            json!({"type": "object"}),
        )]);

        let text = JsonProtocolSerializer.serialize(&catalog).unwrap();
        let parsed: ConfiguredCatalog = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed, catalog);
    }
}
