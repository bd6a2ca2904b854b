//! Core type definitions for stashdb.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the directory holding pending redo-log entries.
pub const REDO_LOG_DIR: &str = "_redo.log";

/// Name of a registered collection.
///
/// The name is also the collection's directory under the storage root and
/// the key write commands use to find the collection that applies them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Creates a collection id after checking it is a usable directory name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for empty names, names with a
    /// path separator, names starting with a dot and the redo-log directory.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
            || name == REDO_LOG_DIR
        {
            return Err(CoreError::invalid_argument(format!(
                "unusable collection name: {name:?}"
            )));
        }
        Ok(Self(name))
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
