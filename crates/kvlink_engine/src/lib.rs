//! # kvlink Engine
//!
//! The raw capability surface that the kvlink handle layer drives, and the
//! bundled engine that implements it.
//!
//! This crate provides:
//! - The [`Engine`], [`RawConnection`], [`RawSession`] and [`RawCursor`] traits
//! - Configuration string parsing ([`config`])
//! - [`KvEngine`], an embedded multi-version key-value engine with snapshot
//!   transactions, checkpoint persistence and compressor extensions
//!
//! Engine handles are deliberately low level: items cross the boundary as
//! byte strings, configuration as strings, and every failure as an
//! [`EngineError`]. Tracking which handles are live and releasing them in
//! order is the job of `kvlink_core`.
//!
//! ## Example
//!
//! ```rust
//! use kvlink_engine::{Engine, KvEngine};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let conn = KvEngine::new().open(dir.path(), "create").unwrap();
//! let session = conn.open_session("").unwrap();
//! session.create("table:t", "key_format=S,value_format=S").unwrap();
//!
//! let mut cursor = session.open_cursor("table:t", "").unwrap();
//! cursor.set_key(b"hello").unwrap();
//! cursor.set_value(b"world").unwrap();
//! cursor.insert().unwrap();
//!
//! cursor.set_key(b"hello").unwrap();
//! cursor.search().unwrap();
//! assert_eq!(cursor.get_value().unwrap(), b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extension;
pub mod home;
pub mod image;
pub mod kv;
pub mod mvcc;
pub mod schema;
pub mod stats;
pub mod store;
pub mod txn;
pub mod uri;

pub use api::{Engine, RawConnection, RawCursor, RawSession};
pub use config::{ConfigMap, ConfigValue, ConfigWriter};
pub use error::{EngineError, EngineResult};
pub use extension::{module_file_name, ENTRY_POINT, KNOWN_COMPRESSORS, MODULE_SUFFIX};
pub use kv::{KvConnection, KvEngine, INSTALL_DIR_ENV};
pub use mvcc::Isolation;
pub use stats::StatisticsLevel;
pub use uri::ObjectUri;
