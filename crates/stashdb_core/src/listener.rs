//! Hooks run before a record is written or removed.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use std::fmt;
use std::marker::PhantomData;

/// Callback invoked by a collection before it accepts a write.
///
/// Returning an error rejects the write before any file is touched; no
/// command is executed or appended to a transaction.
///
/// `delete_by_id` does not load the record it removes and therefore does
/// not run listeners. `delete_all` and `delete_all_of` run
/// `on_before_delete` for every record before anything is deleted.
pub trait RecordListener<T: Record>: Send + Sync {
    /// Called after the id is assigned and before the save command is built.
    fn on_before_save(&self, _record: &T) -> CoreResult<()> {
        Ok(())
    }

    /// Called before the delete command is built.
    fn on_before_delete(&self, _record: &T) -> CoreResult<()> {
        Ok(())
    }
}

/// Listener rejecting saves that fail a predicate.
pub struct Validator<T, F> {
    name: String,
    check: F,
    _record: PhantomData<fn(&T)>,
}

impl<T, F> Validator<T, F>
where
    F: Fn(&T) -> Result<(), String>,
{
    /// Creates a validator; `name` prefixes its error messages.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
            _record: PhantomData,
        }
    }
}

impl<T, F> fmt::Debug for Validator<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

impl<T, F> RecordListener<T> for Validator<T, F>
where
    T: Record,
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn on_before_save(&self, record: &T) -> CoreResult<()> {
        (self.check)(record).map_err(|reason| CoreError::validation(format!("{}: {reason}", self.name)))
    }
}

/// Listener running [`Record::validate`] before every save.
///
/// Installed on every collection when validation is enabled.
pub(crate) struct RecordValidation;

impl<T: Record> RecordListener<T> for RecordValidation {
    fn on_before_save(&self, record: &T) -> CoreResult<()> {
        record.validate().map_err(CoreError::validation)
    }
}
