//! # kvlink Testkit
//!
//! Test utilities for kvlink.
//!
//! This crate provides:
//! - Test fixtures: a temporary database with an open connection
//! - Property-based test generators using proptest
//! - A model harness that checks a table against an in-memory map
//! - A stub engine for exercising the handle layer without storage
//!
//! ## Usage
//!
//! ```rust
//! use kvlink_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let session = db.open_session().unwrap();
//!     session.create_table("test", &Default::default()).unwrap();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod stub;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::stub::*;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use stub::*;
