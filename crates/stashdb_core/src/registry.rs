//! Registry of collections that write commands are applied to.

use crate::error::{CoreError, CoreResult};
use crate::types::CollectionId;
use parking_lot::RwLock;
use serde_json::Value;
use stashdb_storage::{RecordStore, TxContext};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Type-erased view of one collection's store.
///
/// Write commands carry record ids as file stems and records as JSON
/// values, so one command can touch collections of different record types.
pub trait CollectionHandle: Send + Sync {
    /// The collection's name.
    fn name(&self) -> &CollectionId;

    /// Captures the pre-image of `id`.
    fn backup(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()>;

    /// Writes `item` as the new content of `id`.
    fn commit_save(&self, id: &str, item: &Value, ctx: &mut TxContext) -> CoreResult<()>;

    /// Removes `id`.
    fn commit_delete(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()>;

    /// Restores the pre-image of `id`.
    fn rollback(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()>;

    /// Releases the pre-image of `id`.
    fn clear_backup(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()>;

    /// Drops in-memory state of an operation left for recovery.
    fn abandon(&self, ctx: &TxContext);
}

/// [`CollectionHandle`] over a typed record store.
pub(crate) struct StoreHandle<T> {
    name: CollectionId,
    store: Arc<dyn RecordStore<T>>,
}

impl<T> StoreHandle<T> {
    pub(crate) fn new(name: CollectionId, store: Arc<dyn RecordStore<T>>) -> Self {
        Self { name, store }
    }
}

impl<T: 'static> CollectionHandle for StoreHandle<T> {
    fn name(&self) -> &CollectionId {
        &self.name
    }

    fn backup(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()> {
        ctx.set_record_type(std::any::type_name::<T>());
        Ok(self.store.backup(id, ctx)?)
    }

    fn commit_save(&self, id: &str, item: &Value, ctx: &mut TxContext) -> CoreResult<()> {
        ctx.set_record_type(std::any::type_name::<T>());
        let data = self.store.format().serialize(item)?;
        Ok(self.store.save(id, &data, ctx)?)
    }

    fn commit_delete(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()> {
        ctx.set_record_type(std::any::type_name::<T>());
        Ok(self.store.delete(id, ctx)?)
    }

    fn rollback(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()> {
        ctx.set_record_type(std::any::type_name::<T>());
        Ok(self.store.rollback(id, ctx)?)
    }

    fn clear_backup(&self, id: &str, ctx: &mut TxContext) -> CoreResult<()> {
        ctx.set_record_type(std::any::type_name::<T>());
        Ok(self.store.clear_backup(id, ctx)?)
    }

    fn abandon(&self, ctx: &TxContext) {
        self.store.abandon(ctx);
    }
}

/// Collections by name.
#[derive(Default)]
pub struct Registry {
    handles: RwLock<BTreeMap<CollectionId, Arc<dyn CollectionHandle>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handles.read().keys()).finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateCollection`] if the name is taken.
    pub fn register(&self, handle: Arc<dyn CollectionHandle>) -> CoreResult<()> {
        let mut handles = self.handles.write();
        let name = handle.name().clone();
        if handles.contains_key(&name) {
            return Err(CoreError::duplicate_collection(name.as_str()));
        }
        handles.insert(name, handle);
        Ok(())
    }

    /// Removes a collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNotFound`] if nothing is registered
    /// under the name.
    pub fn deregister(&self, name: &CollectionId) -> CoreResult<()> {
        self.handles
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CoreError::collection_not_found(name.as_str()))
    }

    /// Looks up a collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNotFound`] for unknown names.
    pub fn get(&self, name: &CollectionId) -> CoreResult<Arc<dyn CollectionHandle>> {
        self.handles
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::collection_not_found(name.as_str()))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &CollectionId) -> bool {
        self.handles.read().contains_key(name)
    }

    /// Names of all registered collections, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<CollectionId> {
        self.handles.read().keys().cloned().collect()
    }

    /// Returns true if no collection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}
