//! Database configuration.

use crate::error::CoreResult;
use crate::id::IdStrategy;
use stashdb_storage::{fsutil, FileFormat, JsonFormat};
use std::path::PathBuf;
use std::sync::Arc;

/// File format used for record files and redo-log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatKind {
    /// Single-line JSON.
    #[default]
    Json,
    /// Indented JSON.
    PrettyJson,
}

impl FormatKind {
    /// Builds the format strategy.
    #[must_use]
    pub fn file_format(self) -> Arc<dyn FileFormat> {
        match self {
            Self::Json => Arc::new(JsonFormat::compact()),
            Self::PrettyJson => Arc::new(JsonFormat::pretty()),
        }
    }
}

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory; each collection is a sub-directory.
    pub storage_path: PathBuf,

    /// Format of record files and redo-log entries.
    pub format: FormatKind,

    /// Id generator for newly registered collections.
    pub id_strategy: IdStrategy,

    /// Whether `register` wraps collections in the read cache.
    pub cache: bool,

    /// Whether registered collections run [`Record::validate`] before saves.
    ///
    /// [`Record::validate`]: crate::Record::validate
    pub validation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("."),
            format: FormatKind::Json,
            id_strategy: IdStrategy::LongCounter,
            cache: false,
            validation: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration rooted at a fresh directory under the OS temp dir.
    ///
    /// The directory is not removed when the database is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn temporary() -> CoreResult<Self> {
        let path = std::env::temp_dir().join(format!("stashdb-{}", uuid::Uuid::new_v4().simple()));
        fsutil::create_dir_all(&path)?;
        Ok(Self::default().storage_path(path))
    }

    /// Sets the root directory.
    #[must_use]
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Sets the file format.
    #[must_use]
    pub const fn format(mut self, format: FormatKind) -> Self {
        self.format = format;
        self
    }

    /// Sets the id strategy.
    #[must_use]
    pub const fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Sets whether collections are cached by default.
    #[must_use]
    pub const fn cache(mut self, value: bool) -> Self {
        self.cache = value;
        self
    }

    /// Sets whether record validation runs before saves.
    #[must_use]
    pub const fn validation(mut self, value: bool) -> Self {
        self.validation = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage_path, PathBuf::from("."));
        assert_eq!(config.format, FormatKind::Json);
        assert_eq!(config.id_strategy, IdStrategy::LongCounter);
        assert!(!config.cache);
        assert!(config.validation);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .storage_path("/data/stash")
            .format(FormatKind::PrettyJson)
            .id_strategy(IdStrategy::Uuid)
            .cache(true)
            .validation(false);

        assert_eq!(config.storage_path, PathBuf::from("/data/stash"));
        assert_eq!(config.format, FormatKind::PrettyJson);
        assert_eq!(config.id_strategy, IdStrategy::Uuid);
        assert!(config.cache);
        assert!(!config.validation);
    }

    #[test]
    fn both_formats_use_json_extension() {
        assert_eq!(FormatKind::Json.file_format().extension(), ".json");
        assert_eq!(FormatKind::PrettyJson.file_format().extension(), ".json");
    }

    #[test]
    fn temporary_creates_a_fresh_directory() {
        let a = Config::temporary().unwrap();
        let b = Config::temporary().unwrap();
        assert!(a.storage_path.is_dir());
        assert_ne!(a.storage_path, b.storage_path);
        std::fs::remove_dir_all(&a.storage_path).unwrap();
        std::fs::remove_dir_all(&b.storage_path).unwrap();
    }
}
