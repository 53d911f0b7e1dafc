//! Stream configuration: the JSON object tree spec.md §6 describes, turned
//! into a normalized list of simulator descriptors.

use crate::error::{Result, VpmuError};

/// A bound, normalized simulator list: either the single JSON object or
/// JSON array `Stream::bind` was given, flattened to one descriptor per
/// entry (design §6).
#[derive(Clone, Debug)]
pub struct StreamConfig {
    entries: Vec<serde_json::Value>,
}

impl StreamConfig {
    /// Rejects `null` and empty arrays; normalizes a bare object into a
    /// one-element list (design §6).
    pub fn parse(raw: serde_json::Value) -> Result<Self> {
        let entries = match &raw {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        if entries.is_empty() {
            return Err(VpmuError::Config { key: "simulators".into(), detail: "there is no content".into() });
        }
        Ok(StreamConfig { entries })
    }

    pub fn entries(&self) -> &[serde_json::Value] {
        &self.entries
    }

    /// Reads the required `"name"` key from one descriptor (design §6:
    /// "missing required fields fatal with a diagnostic naming the key").
    pub fn simulator_name(entry: &serde_json::Value) -> Result<&str> {
        entry
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VpmuError::Config { key: "name".into(), detail: "missing simulator name".into() })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_null_configuration() {
        assert!(StreamConfig::parse(serde_json::Value::Null).is_err());
    }

    #[test]
    fn rejects_empty_array() {
        assert!(StreamConfig::parse(serde_json::json!([])).is_err());
    }

    #[test]
    fn normalizes_bare_object_to_single_entry() {
        let config = StreamConfig::parse(serde_json::json!({ "name": "two bits" })).unwrap();
        assert_eq!(config.entries().len(), 1);
        assert_eq!(StreamConfig::simulator_name(&config.entries()[0]).unwrap(), "two bits");
    }

    #[test]
    fn missing_name_is_a_config_error_naming_the_key() {
        let config = StreamConfig::parse(serde_json::json!({ "latency": [1] })).unwrap();
        let err = StreamConfig::simulator_name(&config.entries()[0]).unwrap_err();
        assert!(matches!(err, VpmuError::Config { key, .. } if key == "name"));
    }
}
