//! Messages exchanged between pipeline stages

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::Value;
use crate::{Error, Result};

/// A message flowing through a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Structured payload
    pub payload: Value,

    /// Metadata key/value pairs (source offsets, headers, error details)
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Message {
    /// Create a message without metadata
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a metadata entry
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Parse one line of newline-delimited JSON into a message payload
    pub fn from_json_line(line: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| Error::conversion("json line", e.to_string()))?;
        Ok(Self::new(Value::from(json)))
    }

    /// Render the payload as a single line of JSON
    pub fn to_json_line(&self) -> Result<String> {
        if self.payload.is_nothing() {
            return Err(Error::conversion(
                "json line",
                "message payload is nothing and cannot be serialised",
            ));
        }
        serde_json::to_string(&self.payload).map_err(|e| Error::conversion("json line", e.to_string()))
    }
}
