//! File format strategy.
//!
//! A format turns a record (through its `serde_json::Value` form) into the
//! text stored on disk and back. Record files and redo-log entries share the
//! collection's format.

use crate::error::{StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Converts values to file content and back.
pub trait FileFormat: Send + Sync + Debug {
    /// File extension including the leading dot, e.g. `.json`.
    fn extension(&self) -> &str;

    /// Serializes a value to file content.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Format`] if the value cannot be represented.
    fn serialize(&self, value: &Value) -> StorageResult<String>;

    /// Parses file content.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Format`] if the content is malformed.
    fn deserialize(&self, data: &str) -> StorageResult<Value>;
}

/// Typed helpers available on every [`FileFormat`].
pub trait FormatExt: FileFormat {
    /// Serializes any serde value.
    fn encode<T: Serialize>(&self, value: &T) -> StorageResult<String> {
        let value = serde_json::to_value(value)?;
        self.serialize(&value)
    }

    /// Parses file content into a typed value.
    fn decode<T: DeserializeOwned>(&self, data: &str) -> StorageResult<T> {
        let value = self.deserialize(data)?;
        serde_json::from_value(value).map_err(|e| StorageError::format(e.to_string()))
    }
}

impl<F: FileFormat + ?Sized> FormatExt for F {}

/// JSON file format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat {
    pretty: bool,
}

impl JsonFormat {
    /// Compact JSON, one line per file.
    #[must_use]
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// Indented JSON.
    #[must_use]
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Returns true if output is indented.
    #[must_use]
    pub fn is_pretty(&self) -> bool {
        self.pretty
    }
}

impl FileFormat for JsonFormat {
    fn extension(&self) -> &str {
        ".json"
    }

    fn serialize(&self, value: &Value) -> StorageResult<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(text)
    }

    fn deserialize(&self, data: &str) -> StorageResult<Value> {
        Ok(serde_json::from_str(data)?)
    }
}
