//! Per-transaction scratch state handed to every backend call.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one redo-logged operation.
///
/// Assigned by the redo log on begin and reused verbatim when a pending
/// operation is replayed. Rendered as a plain decimal number, which is also
/// the redo-log file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(pub u64);

impl OpId {
    /// Returns the raw counter value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following operation id.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OpId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Scratch state owned by one transaction for its whole duration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxContext {
    op_id: Option<OpId>,
    record_type: Option<&'static str>,
}

impl TxContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context pre-seeded with an existing operation id.
    #[must_use]
    pub fn with_op_id(op_id: OpId) -> Self {
        Self {
            op_id: Some(op_id),
            record_type: None,
        }
    }

    /// The operation id, if begin already ran.
    #[must_use]
    pub fn op_id(&self) -> Option<OpId> {
        self.op_id
    }

    /// The operation id, or an error if begin never ran.
    pub fn require_op_id(&self) -> StorageResult<OpId> {
        self.op_id.ok_or(StorageError::NoOperation)
    }

    /// Records the operation id assigned by the redo log.
    pub fn set_op_id(&mut self, op_id: OpId) {
        self.op_id = Some(op_id);
    }

    /// Type name of the record currently being processed.
    #[must_use]
    pub fn record_type(&self) -> Option<&'static str> {
        self.record_type
    }

    /// Sets the record type before a per-id backend call.
    pub fn set_record_type(&mut self, record_type: &'static str) {
        self.record_type = Some(record_type);
    }
}

impl fmt::Display for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op_id {
            Some(id) => write!(f, "op {id}")?,
            None => write!(f, "op <none>")?,
        }
        if let Some(t) = self.record_type {
            write!(f, " ({t})")?;
        }
        Ok(())
    }
}
