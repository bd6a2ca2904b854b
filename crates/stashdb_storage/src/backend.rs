//! Record store trait definition.

use crate::context::TxContext;
use crate::error::StorageResult;
use crate::format::FileFormat;
use std::sync::Arc;

/// Result of reading one record.
///
/// Distinguishes a record that is not there from one whose file exists but
/// cannot be decoded. The collection layer collapses both to "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The record was read and decoded.
    Found(T),
    /// A file exists but its content does not decode as the record type.
    Corrupt,
    /// No committed record with this id.
    Missing,
}

impl<T> Lookup<T> {
    /// Returns the record, treating corrupt content as absent.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Corrupt | Self::Missing => None,
        }
    }

    /// Returns true for [`Lookup::Found`].
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns true for [`Lookup::Corrupt`].
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt)
    }

    /// Maps the found value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::Corrupt => Lookup::Corrupt,
            Self::Missing => Lookup::Missing,
        }
    }
}

/// Durable, atomic single-record storage for one collection.
///
/// Records are addressed by their file stem. Writes carry the transaction
/// context of the operation that issues them.
///
/// # Protocol
///
/// For every id a transaction touches, the coordinator calls `backup`
/// before any mutation, then `save` or `delete`, then either `rollback` on
/// failure, and finally `clear_backup` exactly once per `backup`.
///
/// # Invariants
///
/// - Reads never observe a partially written file
/// - While any transaction holds an id, reads and `exists` reflect the
///   pre-image captured by the first `backup`
/// - The pre-image is captured once and shared by overlapping transactions
///
/// # Implementors
///
/// - [`super::FileBackend`] - one file per record
/// - [`super::CacheDecorator`] - in-memory view over another store
pub trait RecordStore<T>: Send + Sync {
    /// Lists the ids of all committed records, ascending by stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection directory cannot be listed.
    fn find_all_ids(&self) -> StorageResult<Vec<String>>;

    /// Returns true if a committed record with this id exists.
    fn exists(&self, id: &str) -> bool;

    /// Reads the committed value of a record.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure. Undecodable content is reported as
    /// [`Lookup::Corrupt`], not as an error.
    fn read(&self, id: &str) -> StorageResult<Lookup<T>>;

    /// Writes serialized record content.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging write or the rename fails.
    fn save(&self, id: &str, data: &str, ctx: &TxContext) -> StorageResult<()>;

    /// Removes a record. Removing a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn delete(&self, id: &str, ctx: &TxContext) -> StorageResult<()>;

    /// Captures the pre-image of a record and takes one in-flight reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the pre-image cannot be copied. No reference is
    /// taken in that case.
    fn backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()>;

    /// Restores the pre-image captured by `backup`.
    ///
    /// # Errors
    ///
    /// Returns an error if restoring fails.
    fn rollback(&self, id: &str, ctx: &TxContext) -> StorageResult<()>;

    /// Drops one in-flight reference, deleting the pre-image with the last.
    ///
    /// # Errors
    ///
    /// Returns an error if the pre-image cannot be deleted.
    fn clear_backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()>;

    /// Drops whatever is kept in memory for an operation that will not
    /// finish in this process.
    ///
    /// Called when a transaction closes after a failed rollback. Files are
    /// left untouched for recovery.
    fn abandon(&self, _ctx: &TxContext) {}

    /// The file format of this collection.
    fn format(&self) -> &dyn FileFormat;
}

impl<T, S: RecordStore<T> + ?Sized> RecordStore<T> for Box<S> {
    fn find_all_ids(&self) -> StorageResult<Vec<String>> {
        (**self).find_all_ids()
    }

    fn exists(&self, id: &str) -> bool {
        (**self).exists(id)
    }

    fn read(&self, id: &str) -> StorageResult<Lookup<T>> {
        (**self).read(id)
    }

    fn save(&self, id: &str, data: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).save(id, data, ctx)
    }

    fn delete(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).delete(id, ctx)
    }

    fn backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).backup(id, ctx)
    }

    fn rollback(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).rollback(id, ctx)
    }

    fn clear_backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).clear_backup(id, ctx)
    }

    fn abandon(&self, ctx: &TxContext) {
        (**self).abandon(ctx);
    }

    fn format(&self) -> &dyn FileFormat {
        (**self).format()
    }
}

impl<T, S: RecordStore<T> + ?Sized> RecordStore<T> for Arc<S> {
    fn find_all_ids(&self) -> StorageResult<Vec<String>> {
        (**self).find_all_ids()
    }

    fn exists(&self, id: &str) -> bool {
        (**self).exists(id)
    }

    fn read(&self, id: &str) -> StorageResult<Lookup<T>> {
        (**self).read(id)
    }

    fn save(&self, id: &str, data: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).save(id, data, ctx)
    }

    fn delete(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).delete(id, ctx)
    }

    fn backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).backup(id, ctx)
    }

    fn rollback(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).rollback(id, ctx)
    }

    fn clear_backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        (**self).clear_backup(id, ctx)
    }

    fn abandon(&self, ctx: &TxContext) {
        (**self).abandon(ctx);
    }

    fn format(&self) -> &dyn FileFormat {
        (**self).format()
    }
}
