//! # StashDB Testkit
//!
//! Test utilities for StashDB.
//!
//! This crate provides:
//! - Sample records and temporary databases that can be reopened
//! - A fault-injecting record store
//! - Crash simulation by writing leftover files directly
//! - Property-based test generators using proptest
//!
//! The cross-crate scenario tests live in this crate's `tests/` directory.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod faulty;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faulty::FaultyStore;
pub use fixtures::*;
pub use generators::*;
