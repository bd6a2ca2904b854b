//! In-memory cache decorator over a record store.

use crate::backend::{Lookup, RecordStore};
use crate::context::{OpId, TxContext};
use crate::error::StorageResult;
use crate::format::{FileFormat, FormatExt};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use tracing::{trace, warn};

/// Pending, uncommitted changes of one operation: id to data, `None` for a delete.
type Deltas = HashMap<String, Option<String>>;

/// Serves reads for a whole collection from memory.
///
/// The committed map is loaded eagerly on construction and only changes
/// when an id's backup is cleared, so reads always return the last
/// committed value. A transaction does not see its own writes before it
/// finishes.
///
/// Writes go to the wrapped store first; the new content is parked in a
/// per-operation delta map until `clear_backup` finalizes it or `rollback`
/// discards it.
pub struct CacheDecorator<T, S> {
    delegate: S,
    committed: RwLock<BTreeMap<String, T>>,
    pending: Mutex<HashMap<OpId, Deltas>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> std::fmt::Debug for CacheDecorator<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDecorator")
            .field("committed", &self.committed.read().len())
            .field("pending_ops", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl<T, S> CacheDecorator<T, S>
where
    T: Clone,
    S: RecordStore<T>,
{
    /// Wraps `delegate`, loading every committed record.
    ///
    /// Records that cannot be read or decoded are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the ids cannot be listed.
    pub fn new(delegate: S) -> StorageResult<Self> {
        let mut committed = BTreeMap::new();
        for id in delegate.find_all_ids()? {
            match delegate.read(&id) {
                Ok(Lookup::Found(value)) => {
                    committed.insert(id, value);
                }
                Ok(Lookup::Corrupt) => {
                    warn!(id = %id, "could not decode stored record, leaving it out of the cache");
                }
                Ok(Lookup::Missing) => {}
                Err(e) => {
                    warn!(id = %id, error = %e, "could not read stored record, leaving it out of the cache");
                }
            }
        }

        Ok(Self {
            delegate,
            committed: RwLock::new(committed),
            pending: Mutex::new(HashMap::new()),
            _marker: PhantomData,
        })
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.delegate
    }

    /// Number of committed records held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.committed.read().len()
    }

    /// Returns true if the cache holds no committed record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed.read().is_empty()
    }

    /// Number of operations with parked changes.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.pending.lock().len()
    }

    fn park(&self, id: &str, data: Option<&str>, ctx: &TxContext) -> StorageResult<()> {
        let op_id = ctx.require_op_id()?;
        self.pending
            .lock()
            .entry(op_id)
            .or_default()
            .insert(id.to_string(), data.map(str::to_string));
        Ok(())
    }

    fn take(&self, id: &str, ctx: &TxContext) -> Option<Option<String>> {
        let op_id = ctx.op_id()?;
        let mut pending = self.pending.lock();
        let deltas = pending.get_mut(&op_id)?;
        let delta = deltas.remove(id);
        if deltas.is_empty() {
            pending.remove(&op_id);
        }
        delta
    }
}

impl<T, S> RecordStore<T> for CacheDecorator<T, S>
where
    T: DeserializeOwned + Clone + Send + Sync,
    S: RecordStore<T>,
{
    fn find_all_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self.committed.read().keys().cloned().collect())
    }

    fn exists(&self, id: &str) -> bool {
        self.committed.read().contains_key(id)
    }

    fn read(&self, id: &str) -> StorageResult<Lookup<T>> {
        Ok(match self.committed.read().get(id) {
            Some(value) => Lookup::Found(value.clone()),
            None => Lookup::Missing,
        })
    }

    fn save(&self, id: &str, data: &str, ctx: &TxContext) -> StorageResult<()> {
        self.delegate.save(id, data, ctx)?;
        self.park(id, Some(data), ctx)
    }

    fn delete(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        self.delegate.delete(id, ctx)?;
        self.park(id, None, ctx)
    }

    fn backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        self.delegate.backup(id, ctx)
    }

    fn rollback(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        self.delegate.rollback(id, ctx)?;
        self.take(id, ctx);
        Ok(())
    }

    fn clear_backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        self.delegate.clear_backup(id, ctx)?;

        match self.take(id, ctx) {
            None => trace!(id, %ctx, "no pending change to finalize"),
            Some(None) => {
                self.committed.write().remove(id);
            }
            // the parked string is what the delegate wrote, so decoding it
            // matches a re-read as long as the delegate stores data verbatim
            Some(Some(data)) => match self.delegate.format().decode::<T>(&data) {
                Ok(value) => {
                    self.committed.write().insert(id.to_string(), value);
                }
                Err(e) => {
                    warn!(id, error = %e, "committed record does not decode, dropping it from the cache");
                    self.committed.write().remove(id);
                }
            },
        }
        Ok(())
    }

    fn abandon(&self, ctx: &TxContext) {
        self.delegate.abandon(ctx);
        if let Some(op_id) = ctx.op_id() {
            if self.pending.lock().remove(&op_id).is_some() {
                trace!(%ctx, "dropped parked changes of abandoned operation");
            }
        }
    }

    fn format(&self) -> &dyn FileFormat {
        self.delegate.format()
    }
}
