//! # ShelfDB Testkit
//!
//! Test utilities for ShelfDB.
//!
//! This crate provides:
//! - Test fixtures and engine helpers
//! - Property-based test generators using proptest
//! - A model-checking integration harness
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shelfdb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let db = TestEngine::with_store("items", StoreOptions::new().auto_increment(true));
//!     db.put_all("items", vec![Value::from("a")]);
//!     assert_eq!(db.count("items"), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
