//! # Strata Testkit
//!
//! Test utilities for StrataDB.
//!
//! This crate provides:
//! - Blocking wrappers and temp-directory fixtures for database tests
//! - A fault-injecting engine double for exercising failure paths
//! - Property-based test generators using proptest
//!
//! The crate's own `tests/` directory holds the cross-crate integration
//! tests for the dispatch layer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         put_wait(db, b"k", b"v").unwrap();
//!         assert_eq!(get_wait(db, b"k").unwrap(), b"v");
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod engines;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engines::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use engines::*;
pub use fixtures::*;
pub use generators::*;
