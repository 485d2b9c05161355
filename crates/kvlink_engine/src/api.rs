//! The raw engine capability surface.
//!
//! These traits are the only thing the client layer knows about an engine.
//! Every method takes the engine configuration grammar (see
//! [`crate::config`]) as a plain string; parsing and validation happen on the
//! engine side.
//!
//! Handle ownership follows the engine's rules: a [`RawCursor`] belongs to the
//! [`RawSession`] that opened it, and a session belongs to its
//! [`RawConnection`]. Closing a parent invalidates its children; operations on
//! an invalidated handle fail with [`EngineError::Closed`](crate::EngineError::Closed).

use crate::error::EngineResult;
use std::fmt;
use std::path::Path;

/// Factory for engine connections.
pub trait Engine: Send + Sync + fmt::Debug {
    /// Short engine name, used in logs.
    fn name(&self) -> &str;

    /// Directory the engine was installed in, if known.
    ///
    /// Extension discovery looks for bundled modules below this directory.
    fn install_dir(&self) -> Option<&Path>;

    /// Opens a connection to the database at `home`.
    ///
    /// # Errors
    ///
    /// Fails if the home is unusable, the database is locked, or the
    /// configuration is invalid.
    fn open(&self, home: &Path, config: &str) -> EngineResult<Box<dyn RawConnection>>;
}

/// An open engine connection.
pub trait RawConnection: Send + Sync {
    /// Opens a new session.
    fn open_session(&self, config: &str) -> EngineResult<Box<dyn RawSession>>;

    /// Writes a durable checkpoint of committed state.
    fn checkpoint(&self, config: &str) -> EngineResult<()>;

    /// Loads an extension module.
    fn load_extension(&self, path: &Path, config: &str) -> EngineResult<()>;

    /// Returns engine statistics as `(name, value)` pairs.
    fn statistics(&self) -> EngineResult<Vec<(String, u64)>>;

    /// Closes the connection and every session still open on it.
    fn close(&mut self, config: &str) -> EngineResult<()>;
}

/// An engine session: a single-threaded context for cursors and transactions.
pub trait RawSession: Send {
    /// The engine's native identifier for this session.
    ///
    /// Engines that cannot identify a session return `None`.
    fn native_id(&self) -> Option<String>;

    /// Creates a table or index. Creating an identical object again succeeds.
    fn create(&self, uri: &str, config: &str) -> EngineResult<()>;

    /// Opens a cursor on a table, index or statistics source.
    fn open_cursor(&self, uri: &str, config: &str) -> EngineResult<Box<dyn RawCursor>>;

    /// Starts an explicit transaction.
    fn begin_transaction(&self, config: &str) -> EngineResult<()>;

    /// Commits the running transaction.
    fn commit_transaction(&self, config: &str) -> EngineResult<()>;

    /// Rolls back the running transaction.
    fn rollback_transaction(&self, config: &str) -> EngineResult<()>;

    /// Drops a table or index.
    fn drop_object(&self, uri: &str, config: &str) -> EngineResult<()>;

    /// Compacts a table.
    fn compact(&self, uri: &str, config: &str) -> EngineResult<()>;

    /// Closes the session, rolling back any running transaction.
    fn close(&mut self, config: &str) -> EngineResult<()>;
}

/// A cursor over the records of one object.
///
/// Keys and values cross this boundary as item bytes: the unpacked item for
/// ordinary cursors, the packed storage form for cursors opened with `raw`.
pub trait RawCursor: Send {
    /// URI the cursor was opened on.
    fn uri(&self) -> &str;

    /// Stages the key for the next operation.
    fn set_key(&mut self, key: &[u8]) -> EngineResult<()>;

    /// Stages the value for the next write.
    fn set_value(&mut self, value: &[u8]) -> EngineResult<()>;

    /// Key of the current record.
    ///
    /// Fails with `NotPositioned` when the cursor has no current record.
    fn get_key(&self) -> EngineResult<Vec<u8>>;

    /// Value of the current record.
    fn get_value(&self) -> EngineResult<Vec<u8>>;

    /// Moves to the next record; `NotFound` when exhausted.
    fn next(&mut self) -> EngineResult<()>;

    /// Moves to the previous record; `NotFound` when exhausted.
    fn prev(&mut self) -> EngineResult<()>;

    /// Clears the position and staged key and value.
    fn reset(&mut self) -> EngineResult<()>;

    /// Positions on the staged key; `NotFound` if absent.
    fn search(&mut self) -> EngineResult<()>;

    /// Positions on the staged key or a neighbor.
    ///
    /// Returns 0 for an exact match, 1 when positioned on a larger key and
    /// -1 when positioned on a smaller key.
    fn search_near(&mut self) -> EngineResult<i32>;

    /// Inserts the staged key and value.
    fn insert(&mut self) -> EngineResult<()>;

    /// Updates the staged key with the staged value.
    fn update(&mut self) -> EngineResult<()>;

    /// Removes the staged key.
    fn remove(&mut self) -> EngineResult<()>;

    /// Closes the cursor.
    fn close(&mut self) -> EngineResult<()>;
}
