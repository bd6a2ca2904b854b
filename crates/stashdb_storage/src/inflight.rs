//! Reference counting of in-flight transactions per record id.
//!
//! Each id moves through `NoBackup -> Backed(n) -> NoBackup`. The backup
//! file is created on the `NoBackup -> Backed(1)` edge and deleted on the
//! `Backed(1) -> NoBackup` edge; every other transition only moves the
//! counter. Callers hold the id's path lock while changing its state, so
//! the check-then-act sequence around the shadow file is never interleaved
//! for the same id.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Backup state of a single id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    /// No transaction holds the id.
    NoBackup,
    /// `n` transactions have backed up the id and not yet cleared it.
    Backed(NonZeroUsize),
}

/// Outcome of [`InFlight::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The id was free; the caller must capture the pre-image.
    First,
    /// Another transaction already captured the pre-image.
    Shared,
}

/// Outcome of [`InFlight::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// The last reference was dropped; the pre-image may be deleted.
    Last,
    /// Other transactions still hold the id.
    Shared,
    /// Nobody held the id.
    NotHeld,
}

/// In-flight reference counts for one collection.
#[derive(Debug, Default)]
pub struct InFlight {
    counts: RwLock<HashMap<String, NonZeroUsize>>,
}

impl InFlight {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state of `id`.
    #[must_use]
    pub fn state(&self, id: &str) -> BackupState {
        match self.counts.read().get(id) {
            Some(n) => BackupState::Backed(*n),
            None => BackupState::NoBackup,
        }
    }

    /// Returns true if at least one transaction holds `id`.
    #[must_use]
    pub fn is_held(&self, id: &str) -> bool {
        self.counts.read().contains_key(id)
    }

    /// Adds one reference to `id`.
    pub fn acquire(&self, id: &str) -> Acquired {
        let mut counts = self.counts.write();
        match counts.get_mut(id) {
            Some(n) => {
                *n = n.saturating_add(1);
                Acquired::Shared
            }
            None => {
                counts.insert(id.to_string(), NonZeroUsize::MIN);
                Acquired::First
            }
        }
    }

    /// Drops one reference to `id`.
    pub fn release(&self, id: &str) -> Released {
        let mut counts = self.counts.write();
        let Some(n) = counts.get(id).copied() else {
            return Released::NotHeld;
        };
        match NonZeroUsize::new(n.get() - 1) {
            Some(rest) => {
                counts.insert(id.to_string(), rest);
                Released::Shared
            }
            None => {
                counts.remove(id);
                Released::Last
            }
        }
    }

    /// Number of ids currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.read().len()
    }

    /// Returns true if no id is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.read().is_empty()
    }
}
