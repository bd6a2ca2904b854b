//! Typed collection facade.
//!
//! A collection turns application calls into write commands. Every write
//! has two forms: the plain one runs in its own transaction, the `_in_tx`
//! one appends the command to an explicit [`Transaction`].

use crate::command::WriteCommand;
use crate::error::{CoreError, CoreResult};
use crate::id::IdGenerator;
use crate::listener::RecordListener;
use crate::record::{Record, RecordId};
use crate::transaction::{Transaction, TransactionManager};
use crate::types::CollectionId;
use parking_lot::RwLock;
use stashdb_storage::{check_stem, Lookup, RecordStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// A named set of records of type `T`.
///
/// Handles are cheap to clone and share the same store, id generator and
/// listeners.
pub struct Collection<T: Record> {
    name: CollectionId,
    store: Arc<dyn RecordStore<T>>,
    ids: Arc<dyn IdGenerator<T::Id>>,
    listeners: Arc<RwLock<Vec<Arc<dyn RecordListener<T>>>>>,
    manager: Arc<TransactionManager>,
}

impl<T: Record> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: Arc::clone(&self.store),
            ids: Arc::clone(&self.ids),
            listeners: Arc::clone(&self.listeners),
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<T: Record> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("record", &std::any::type_name::<T>())
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl<T: Record> Collection<T> {
    pub(crate) fn new(
        name: CollectionId,
        store: Arc<dyn RecordStore<T>>,
        ids: Arc<dyn IdGenerator<T::Id>>,
        manager: Arc<TransactionManager>,
    ) -> Self {
        Self {
            name,
            store,
            ids,
            listeners: Arc::new(RwLock::new(Vec::new())),
            manager,
        }
    }

    /// The collection's name.
    #[must_use]
    pub fn name(&self) -> &CollectionId {
        &self.name
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore<T>> {
        &self.store
    }

    /// The id generator.
    #[must_use]
    pub fn id_generator(&self) -> &Arc<dyn IdGenerator<T::Id>> {
        &self.ids
    }

    /// Adds a listener run before every save and delete of a loaded record.
    pub fn add_listener(&self, listener: impl RecordListener<T> + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Seeds the id generator with the ids currently stored.
    pub(crate) fn seed_ids(&self) -> CoreResult<()> {
        let stored: Vec<T::Id> = self.sorted_ids()?.into_iter().map(|(id, _)| id).collect();
        self.ids.seed(&stored);
        Ok(())
    }

    /// All readable records, ordered by id.
    ///
    /// Files whose name is not an id of this collection or whose content
    /// does not decode are skipped.
    pub fn find_all(&self) -> CoreResult<Vec<T>> {
        Ok(self
            .sorted_ids()?
            .into_iter()
            .filter_map(|(_, stem)| self.read_stem(&stem).found())
            .collect())
    }

    /// The readable records among `ids`, ordered by id.
    pub fn find_all_by_id(&self, ids: &[T::Id]) -> CoreResult<Vec<T>> {
        let wanted: BTreeSet<&T::Id> = ids.iter().collect();
        Ok(self
            .sorted_ids()?
            .into_iter()
            .filter(|(id, _)| wanted.contains(id))
            .filter_map(|(_, stem)| self.read_stem(&stem).found())
            .collect())
    }

    /// Reads one record; corrupt content reads as absent.
    #[must_use]
    pub fn find_one(&self, id: &T::Id) -> Option<T> {
        self.lookup(id).found()
    }

    /// Reads one record, telling corrupt content apart from absence.
    #[must_use]
    pub fn lookup(&self, id: &T::Id) -> Lookup<T> {
        let stem = id.to_stem();
        if check_stem(&stem).is_err() {
            return Lookup::Missing;
        }
        self.read_stem(&stem)
    }

    /// Returns true if a committed file exists for `id`.
    #[must_use]
    pub fn exists_by_id(&self, id: &T::Id) -> bool {
        let stem = id.to_stem();
        check_stem(&stem).is_ok() && self.store.exists(&stem)
    }

    /// Number of readable records.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.find_all()?.len())
    }

    /// Saves one record, assigning an id if it has none.
    ///
    /// # Errors
    ///
    /// Input errors (no id can be assigned, unusable id, rejected by a
    /// listener) are returned before any I/O. Otherwise see
    /// [`Transaction::commit`].
    pub fn save(&self, record: &mut T) -> CoreResult<()> {
        let command = self.prepare_save(record)?;
        self.manager.execute(command)
    }

    /// Appends a save of `record` to `tx`.
    pub fn save_in_tx(&self, tx: &mut Transaction, record: &mut T) -> CoreResult<()> {
        let command = self.prepare_save(record)?;
        tx.push(self.name.clone(), command)
    }

    /// Saves several records in one transaction. An empty slice is a no-op.
    pub fn save_all(&self, records: &mut [T]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut composite = WriteCommand::composite();
        for record in records.iter_mut() {
            let command = self.prepare_save(record)?;
            composite.push(self.name.clone(), command);
        }
        self.manager.execute(composite)
    }

    /// Appends saves of `records` to `tx`.
    pub fn save_all_in_tx(&self, tx: &mut Transaction, records: &mut [T]) -> CoreResult<()> {
        let commands = records
            .iter_mut()
            .map(|record| self.prepare_save(record))
            .collect::<CoreResult<Vec<_>>>()?;
        for command in commands {
            tx.push(self.name.clone(), command)?;
        }
        Ok(())
    }

    /// Deletes one stored record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a transient record or
    /// one that is not stored.
    pub fn delete(&self, record: &T) -> CoreResult<()> {
        let command = self.prepare_delete(record, None)?;
        self.manager.execute(command)
    }

    /// Appends a delete of `record` to `tx`.
    ///
    /// A record saved earlier in the same transaction counts as stored.
    pub fn delete_in_tx(&self, tx: &mut Transaction, record: &T) -> CoreResult<()> {
        let command = self.prepare_delete(record, Some(&*tx))?;
        tx.push(self.name.clone(), command)
    }

    /// Deletes the record stored under `id`. Listeners are not run.
    pub fn delete_by_id(&self, id: &T::Id) -> CoreResult<()> {
        let command = self.prepare_delete_by_id(id, None)?;
        self.manager.execute(command)
    }

    /// Appends a delete of `id` to `tx`. Listeners are not run.
    pub fn delete_by_id_in_tx(&self, tx: &mut Transaction, id: &T::Id) -> CoreResult<()> {
        let command = self.prepare_delete_by_id(id, Some(&*tx))?;
        tx.push(self.name.clone(), command)
    }

    /// Deletes several records in one transaction. An empty slice is a no-op.
    ///
    /// Records are not checked for existence; deleting a missing one
    /// succeeds.
    pub fn delete_all_of(&self, records: &[T]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut composite = WriteCommand::composite();
        for command in self.prepare_delete_all(records)? {
            composite.push(self.name.clone(), command);
        }
        self.manager.execute(composite)
    }

    /// Appends deletes of `records` to `tx`.
    pub fn delete_all_of_in_tx(&self, tx: &mut Transaction, records: &[T]) -> CoreResult<()> {
        for command in self.prepare_delete_all(records)? {
            tx.push(self.name.clone(), command)?;
        }
        Ok(())
    }

    /// Deletes every readable record in one transaction.
    pub fn delete_all(&self) -> CoreResult<()> {
        self.delete_all_of(&self.find_all()?)
    }

    /// Appends deletes of every readable record to `tx`.
    pub fn delete_all_in_tx(&self, tx: &mut Transaction) -> CoreResult<()> {
        self.delete_all_of_in_tx(tx, &self.find_all()?)
    }

    fn prepare_save(&self, record: &mut T) -> CoreResult<WriteCommand> {
        self.ids.assign(record)?;
        let id = record
            .id()
            .ok_or_else(|| CoreError::invalid_argument(format!("{} record has no id", self.name)))?;
        let stem = stem_of(&id)?;

        for listener in self.listeners.read().iter() {
            listener.on_before_save(record)?;
        }

        Ok(WriteCommand::Save {
            collection: self.name.clone(),
            id: stem,
            item: serde_json::to_value(&*record)?,
        })
    }

    fn prepare_delete(&self, record: &T, tx: Option<&Transaction>) -> CoreResult<WriteCommand> {
        let id = record
            .id()
            .ok_or_else(|| CoreError::invalid_argument(format!("cannot delete transient {} record", self.name)))?;
        let command = self.prepare_delete_by_id(&id, tx)?;

        for listener in self.listeners.read().iter() {
            listener.on_before_delete(record)?;
        }
        Ok(command)
    }

    fn prepare_delete_by_id(&self, id: &T::Id, tx: Option<&Transaction>) -> CoreResult<WriteCommand> {
        let stem = stem_of(id)?;
        let stored = self.read_stem(&stem).is_found();
        let created_in_tx = tx.is_some_and(|tx| tx.is_any_create(&self.name, &stem));
        if !stored && !created_in_tx {
            return Err(CoreError::invalid_argument(format!(
                "cannot delete {}/{stem}: no such record",
                self.name
            )));
        }
        Ok(self.delete_command(stem))
    }

    fn prepare_delete_all(&self, records: &[T]) -> CoreResult<Vec<WriteCommand>> {
        let stems = records
            .iter()
            .map(|record| {
                let id = record.id().ok_or_else(|| {
                    CoreError::invalid_argument(format!("cannot delete transient {} record", self.name))
                })?;
                stem_of(&id)
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let listeners = self.listeners.read();
        for record in records {
            for listener in listeners.iter() {
                listener.on_before_delete(record)?;
            }
        }
        Ok(stems.into_iter().map(|stem| self.delete_command(stem)).collect())
    }

    fn delete_command(&self, stem: String) -> WriteCommand {
        WriteCommand::Delete {
            collection: self.name.clone(),
            id: stem,
        }
    }

    fn read_stem(&self, stem: &str) -> Lookup<T> {
        match self.store.read(stem) {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(collection = %self.name, id = %stem, error = %e, "could not read record");
                Lookup::Corrupt
            }
        }
    }

    /// Stored ids that parse as `T::Id`, ascending.
    fn sorted_ids(&self) -> CoreResult<Vec<(T::Id, String)>> {
        let mut ids: Vec<(T::Id, String)> = self
            .store
            .find_all_ids()?
            .into_iter()
            .filter_map(|stem| match T::Id::from_stem(&stem) {
                Some(id) => Some((id, stem)),
                None => {
                    warn!(collection = %self.name, file = %stem, "skipping file that is not a record id");
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

fn stem_of<K: RecordId>(id: &K) -> CoreResult<String> {
    let stem = id.to_stem();
    check_stem(&stem).map_err(|e| CoreError::invalid_argument(e.to_string()))?;
    Ok(stem)
}
