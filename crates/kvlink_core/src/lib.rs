//! # kvlink Core
//!
//! Safe handles over an embedded transactional key-value engine.
//!
//! This crate provides:
//! - [`Connection`]: database lifecycle, session tracking, checkpoints and
//!   extension loading
//! - [`Session`]: schema operations and transaction boundaries
//! - [`Cursor`]: positioning and string/byte data access over one object
//! - Typed configuration for every operation ([`config`])
//! - Best-effort compression extension discovery ([`extensions`])
//!
//! ## Handle discipline
//!
//! - A connection releases every session it opened, exactly once, when it
//!   closes; closing twice is harmless.
//! - A session deregisters itself from its connection on its first close;
//!   later closes do nothing.
//! - A cursor borrows its session, so the session cannot be closed while
//!   the cursor is alive.
//! - Lookups that miss and scans that run out return `None`, not errors.
//!
//! ## Example
//!
//! ```rust
//! use kvlink_core::config::{ConnectionConfig, TableConfig};
//! use kvlink_core::extensions::ExtensionDiscovery;
//! use kvlink_core::Connection;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let conn = Connection::new();
//! conn.open(dir.path(), &ConnectionConfig::new().extensions(ExtensionDiscovery::disabled()))
//!     .unwrap();
//!
//! let session = conn.open_session().unwrap();
//! session.create_table("users", &TableConfig::new()).unwrap();
//!
//! session.begin_transaction().unwrap();
//! let mut cursor = session.open_cursor("users").unwrap();
//! cursor.set("alice", "admin").unwrap();
//! cursor.insert().unwrap();
//! cursor.close().unwrap();
//! session.commit_transaction().unwrap();
//!
//! let mut cursor = session.open_cursor("users").unwrap();
//! let record = cursor.next().unwrap().unwrap();
//! assert_eq!((record.key.as_str(), record.value.as_str()), ("alice", "admin"));
//! assert!(cursor.next().unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
pub mod config;
mod connection;
mod cursor;
mod error;
pub mod extensions;
mod session;
mod types;

pub use config::{
    CheckpointConfig, CommitConfig, CompactConfig, ConnectionConfig, CursorConfig, DropConfig,
    ExtensionConfig, IndexConfig, RollbackConfig, TableConfig, TransactionConfig,
};
pub use connection::Connection;
pub use cursor::{Cursor, Records};
pub use error::{CoreError, CoreResult};
pub use extensions::{ExtensionDiscovery, ExtensionAttempt, ExtensionReport, LoadOutcome};
pub use kvlink_engine::{EngineError, Isolation, StatisticsLevel};
pub use session::Session;
pub use types::{NearMatch, Record, SessionId};
