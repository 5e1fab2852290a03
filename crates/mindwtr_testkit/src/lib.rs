//! # mindwtr Testkit
//!
//! Test utilities for mindwtr.
//!
//! This crate provides:
//! - Entity and snapshot fixtures with fixed timestamps
//! - Property-based test generators using proptest
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust
//! use mindwtr_testkit::prelude::*;
//!
//! let snapshot = SnapshotBuilder::new()
//!     .task(task("t1", "Buy milk", timestamp(1)))
//!     .build();
//! assert_eq!(snapshot.tasks.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
