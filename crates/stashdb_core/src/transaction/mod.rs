//! Transactions over write commands.
//!
//! A transaction goes through four phases:
//! - **begin**: the command is written to the redo log
//! - **backup**: the pre-image of every touched record is captured
//! - **commit**: the new record files are written, or the pre-images
//!   restored if that fails
//! - **cleanup**: the redo-log entry is erased and the backups released
//!
//! A crash between begin and cleanup leaves the redo-log entry behind;
//! recovery replays it.

mod handle;
mod manager;
mod state;

pub use handle::Transaction;
pub use manager::TransactionManager;
pub use state::TransactionState;
