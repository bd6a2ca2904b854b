//! Id generation strategies.

use crate::error::{CoreError, CoreResult};
use crate::record::{Record, RecordId};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::warn;
use uuid::Uuid;

/// Produces ids for transient records of one collection.
pub trait IdGenerator<K: RecordId>: Send + Sync + Debug {
    /// Marks `last` as the most recently used id.
    fn reserve_last(&self, last: Option<&K>);

    /// Seeds the generator from the ids already stored.
    fn seed(&self, stored: &[K]) {
        self.reserve_last(stored.iter().max());
    }

    /// Produces the next id.
    ///
    /// # Errors
    ///
    /// Returns an error if the strategy cannot produce ids of type `K`.
    fn next_id(&self) -> CoreResult<K>;
}

impl<'a, K: RecordId> dyn IdGenerator<K> + 'a {
    /// Gives `record` a fresh id if it has none.
    ///
    /// Returns true if an id was assigned.
    pub fn assign<T: Record<Id = K>>(&self, record: &mut T) -> CoreResult<bool> {
        if record.id().is_some() {
            return Ok(false);
        }
        record.set_id(self.next_id()?);
        Ok(true)
    }
}

/// Which id generator a collection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Sequence 1, 2, 3, ... continuing after the greatest stored id.
    #[default]
    LongCounter,
    /// Random v4 UUIDs.
    Uuid,
    /// The caller always provides the id.
    Provided,
}

impl IdStrategy {
    /// Creates a generator for ids of type `K`.
    #[must_use]
    pub fn generator<K: RecordId>(self) -> Box<dyn IdGenerator<K>> {
        match self {
            Self::LongCounter => Box::new(LongCounterIdGenerator::new()),
            Self::Uuid => Box::new(UuidIdGenerator::new()),
            Self::Provided => Box::new(ProvidedIdGenerator::new()),
        }
    }
}

/// Generates ids as a 64-bit sequence.
///
/// The counter wraps from `i64::MAX` to `i64::MIN`.
#[derive(Debug)]
pub struct LongCounterIdGenerator<K> {
    last: Mutex<i64>,
    _marker: PhantomData<fn() -> K>,
}

impl<K> Default for LongCounterIdGenerator<K> {
    fn default() -> Self {
        Self {
            last: Mutex::new(0),
            _marker: PhantomData,
        }
    }
}

impl<K> LongCounterIdGenerator<K> {
    /// Creates a generator whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: RecordId> IdGenerator<K> for LongCounterIdGenerator<K> {
    fn reserve_last(&self, last: Option<&K>) {
        let value = match last {
            None => 0,
            Some(id) => id.as_counter().unwrap_or_else(|| {
                warn!(id = %id, "could not parse last id as a counter, starting from 0");
                0
            }),
        };
        *self.last.lock() = value;
    }

    fn seed(&self, stored: &[K]) {
        let greatest = stored.iter().filter_map(RecordId::as_counter).max();
        match greatest {
            Some(value) => *self.last.lock() = value,
            None => self.reserve_last(stored.iter().max()),
        }
    }

    fn next_id(&self) -> CoreResult<K> {
        let mut last = self.last.lock();
        let next = last.wrapping_add(1);
        let id = K::from_counter(next).ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "counter value {next} is not a valid {}",
                std::any::type_name::<K>()
            ))
        })?;
        *last = next;
        Ok(id)
    }
}

/// Generates random v4 UUIDs.
#[derive(Debug)]
pub struct UuidIdGenerator<K> {
    _marker: PhantomData<fn() -> K>,
}

impl<K> Default for UuidIdGenerator<K> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> UuidIdGenerator<K> {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: RecordId> IdGenerator<K> for UuidIdGenerator<K> {
    fn reserve_last(&self, _last: Option<&K>) {}

    fn next_id(&self) -> CoreResult<K> {
        K::from_uuid(Uuid::new_v4()).ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "{} cannot hold a UUID",
                std::any::type_name::<K>()
            ))
        })
    }
}

/// Never generates ids: every record must carry one.
#[derive(Debug)]
pub struct ProvidedIdGenerator<K> {
    _marker: PhantomData<fn() -> K>,
}

impl<K> Default for ProvidedIdGenerator<K> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> ProvidedIdGenerator<K> {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: RecordId> IdGenerator<K> for ProvidedIdGenerator<K> {
    fn reserve_last(&self, _last: Option<&K>) {}

    fn next_id(&self) -> CoreResult<K> {
        Err(CoreError::invalid_argument(
            "record has no id and ids must be provided by the caller",
        ))
    }
}
