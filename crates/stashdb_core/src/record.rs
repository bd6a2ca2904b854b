//! Record and record id traits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

/// Identifier of a stored record.
///
/// Every id has a file stem representation: the record lives in
/// `<collection>/<stem><ext>`. A stem must be non-empty and must not
/// contain `.`, `/` or `\`.
pub trait RecordId: Clone + Ord + Hash + Debug + Display + Send + Sync + 'static {
    /// Renders the id as a file stem.
    fn to_stem(&self) -> String;

    /// Parses a file stem. Returns `None` if the stem is not an id of this type.
    fn from_stem(stem: &str) -> Option<Self>;

    /// Builds an id from a counter value, if this id type supports counters.
    fn from_counter(_value: i64) -> Option<Self> {
        None
    }

    /// Reads the id as a counter value, if it is one.
    fn as_counter(&self) -> Option<i64> {
        None
    }

    /// Builds an id from a random UUID, if this id type supports it.
    fn from_uuid(_value: Uuid) -> Option<Self> {
        None
    }
}

impl RecordId for String {
    fn to_stem(&self) -> String {
        self.clone()
    }

    fn from_stem(stem: &str) -> Option<Self> {
        Some(stem.to_string())
    }

    fn from_counter(value: i64) -> Option<Self> {
        Some(value.to_string())
    }

    fn as_counter(&self) -> Option<i64> {
        self.parse().ok()
    }

    fn from_uuid(value: Uuid) -> Option<Self> {
        Some(value.to_string())
    }
}

impl RecordId for i64 {
    fn to_stem(&self) -> String {
        self.to_string()
    }

    fn from_stem(stem: &str) -> Option<Self> {
        stem.parse().ok()
    }

    fn from_counter(value: i64) -> Option<Self> {
        Some(value)
    }

    fn as_counter(&self) -> Option<i64> {
        Some(*self)
    }
}

impl RecordId for u64 {
    fn to_stem(&self) -> String {
        self.to_string()
    }

    fn from_stem(stem: &str) -> Option<Self> {
        stem.parse().ok()
    }

    fn from_counter(value: i64) -> Option<Self> {
        u64::try_from(value).ok()
    }

    fn as_counter(&self) -> Option<i64> {
        i64::try_from(*self).ok()
    }
}

impl RecordId for Uuid {
    fn to_stem(&self) -> String {
        self.hyphenated().to_string()
    }

    fn from_stem(stem: &str) -> Option<Self> {
        Uuid::parse_str(stem).ok()
    }

    fn from_uuid(value: Uuid) -> Option<Self> {
        Some(value)
    }
}

/// A value stored as one file in a collection.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use stashdb_core::Record;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct User {
///     id: Option<String>,
///     name: String,
/// }
///
/// impl Record for User {
///     type Id = String;
///
///     fn id(&self) -> Option<String> {
///         self.id.clone()
///     }
///
///     fn set_id(&mut self, id: String) {
///         self.id = Some(id);
///     }
///
///     fn validate(&self) -> Result<(), String> {
///         if self.name.is_empty() {
///             return Err("name must not be empty".into());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The id type.
    type Id: RecordId;

    /// The record's id, `None` while the record is transient.
    fn id(&self) -> Option<Self::Id>;

    /// Assigns the id of a transient record.
    fn set_id(&mut self, id: Self::Id);

    /// Checks the record's own constraints.
    ///
    /// Run before every save when the database has validation enabled.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
