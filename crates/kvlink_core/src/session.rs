//! Sessions: schema operations and transaction boundaries.

use crate::config::{
    CommitConfig, CompactConfig, CursorConfig, DropConfig, IndexConfig, RollbackConfig,
    TableConfig, TransactionConfig,
};
use crate::connection::ConnectionShared;
use crate::cursor::Cursor;
use crate::error::{CoreError, CoreResult};
use crate::types::SessionId;
use kvlink_engine::RawSession;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Holder of a raw session handle, shared by a [`Session`] and the
/// connection's registry.
///
/// The handle is present while the session is live. Taking it out is the
/// only way to release it, so whoever takes it releases it exactly once.
/// Every call on the session or its cursors runs under the slot's lock.
pub(crate) struct SessionSlot {
    raw: Mutex<Option<Box<dyn RawSession>>>,
}

impl SessionSlot {
    pub(crate) fn new(raw: Box<dyn RawSession>) -> Self {
        Self {
            raw: Mutex::new(Some(raw)),
        }
    }

    /// Runs `f` against the live handle.
    pub(crate) fn with<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&dyn RawSession) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let guard = self.raw.lock();
        let raw = guard.as_deref().ok_or(CoreError::SessionClosed(id))?;
        f(raw)
    }

    /// Takes the handle out, leaving the slot closed.
    pub(crate) fn take(&self) -> Option<Box<dyn RawSession>> {
        self.raw.lock().take()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.raw.lock().is_none()
    }
}

/// Closes a raw session handle taken out of its slot.
pub(crate) fn release(id: SessionId, mut raw: Box<dyn RawSession>) -> CoreResult<()> {
    raw.close("")?;
    tracing::debug!(session = %id, "session released");
    Ok(())
}

/// A session opened from a [`Connection`](crate::Connection).
///
/// Cursors borrow their session, so the session cannot be closed or dropped
/// while one of its cursors is alive. Closing the connection closes every
/// session it opened; later calls on such a session fail with
/// [`CoreError::SessionClosed`].
pub struct Session {
    id: SessionId,
    slot: Arc<SessionSlot>,
    connection: Weak<ConnectionShared>,
}

impl Session {
    pub(crate) fn new(id: SessionId, slot: Arc<SessionSlot>, connection: Weak<ConnectionShared>) -> Self {
        Self {
            id,
            slot,
            connection,
        }
    }

    /// Wraps a raw session that no connection tracks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSession`] if the handle carries no valid
    /// native identifier. The handle is closed in that case.
    pub fn detached(mut raw: Box<dyn RawSession>) -> CoreResult<Self> {
        match raw.native_id().as_deref().and_then(SessionId::from_native) {
            Some(id) => Ok(Self::new(id, Arc::new(SessionSlot::new(raw)), Weak::new())),
            None => {
                if let Err(err) = raw.close("") {
                    tracing::warn!(error = %err, "failed to close session without identifier");
                }
                Err(CoreError::InvalidSession)
            }
        }
    }

    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns true once the session has been closed, by [`Session::close`]
    /// or by its connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    pub(crate) fn slot(&self) -> &SessionSlot {
        &self.slot
    }

    fn with<T>(&self, f: impl FnOnce(&dyn RawSession) -> CoreResult<T>) -> CoreResult<T> {
        self.slot.with(self.id, f)
    }

    /// Creates the table `table:<name>`.
    ///
    /// Creating an existing table with the same configuration succeeds.
    ///
    /// # Errors
    ///
    /// Fails for an invalid configuration, a conflicting existing table, or
    /// a block compressor whose extension is not loaded.
    pub fn create_table(&self, name: &str, config: &TableConfig) -> CoreResult<()> {
        let uri = format!("table:{name}");
        self.with(|raw| Ok(raw.create(&uri, &config.to_string())?))?;
        tracing::debug!(session = %self.id, uri = %uri, "table created");
        Ok(())
    }

    /// Opens a cursor on `table:<table>` with the default configuration.
    ///
    /// # Errors
    ///
    /// Fails if the table does not exist or the session is closed.
    pub fn open_cursor(&self, table: &str) -> CoreResult<Cursor<'_>> {
        self.open_cursor_with_config(&format!("table:{table}"), &CursorConfig::default())
    }

    /// Opens a cursor on any URI: `table:`, `index:` or `statistics:`.
    ///
    /// # Errors
    ///
    /// Fails if the object does not exist, the configuration is invalid, or
    /// the session is closed.
    pub fn open_cursor_with_config(&self, uri: &str, config: &CursorConfig) -> CoreResult<Cursor<'_>> {
        let raw = self.with(|raw| Ok(raw.open_cursor(uri, &config.to_string())?))?;
        tracing::debug!(session = %self.id, uri, "cursor opened");
        Ok(Cursor::new(self, raw))
    }

    /// Begins a transaction with the session's default isolation.
    ///
    /// # Errors
    ///
    /// Fails if a transaction is already running.
    pub fn begin_transaction(&self) -> CoreResult<()> {
        self.begin_transaction_with(&TransactionConfig::default())
    }

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Fails if a transaction is already running or the configuration is
    /// rejected by the engine.
    pub fn begin_transaction_with(&self, config: &TransactionConfig) -> CoreResult<()> {
        self.with(|raw| Ok(raw.begin_transaction(&config.to_string())?))
    }

    /// Commits the running transaction.
    ///
    /// # Errors
    ///
    /// Fails if no transaction is running. A transaction that hit a write
    /// conflict fails with a conflict error and is rolled back.
    pub fn commit_transaction(&self) -> CoreResult<()> {
        self.commit_transaction_with(&CommitConfig::default())
    }

    /// Commits the running transaction with options.
    ///
    /// # Errors
    ///
    /// See [`Session::commit_transaction`].
    pub fn commit_transaction_with(&self, config: &CommitConfig) -> CoreResult<()> {
        self.with(|raw| Ok(raw.commit_transaction(&config.to_string())?))
    }

    /// Rolls back the running transaction.
    ///
    /// # Errors
    ///
    /// Fails if no transaction is running.
    pub fn rollback_transaction(&self) -> CoreResult<()> {
        self.rollback_transaction_with(&RollbackConfig::default())
    }

    /// Rolls back the running transaction with options.
    ///
    /// # Errors
    ///
    /// Fails if no transaction is running.
    pub fn rollback_transaction_with(&self, config: &RollbackConfig) -> CoreResult<()> {
        self.with(|raw| Ok(raw.rollback_transaction(&config.to_string())?))
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` succeeds. Rolls back when `f` fails and returns its
    /// error. A failed commit leaves no transaction running. Nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns the error from `begin`, from `f`, or from the commit.
    pub fn transaction<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Session) -> CoreResult<T>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback_transaction() {
                    tracing::warn!(session = %self.id, error = %rollback, "rollback after failure failed");
                }
                Err(err)
            }
        }
    }

    /// Creates an index such as `index:<table>:<name>`.
    ///
    /// The table must have been created with named `columns`.
    ///
    /// # Errors
    ///
    /// Fails if the table is missing, has no named columns, or the index
    /// names an unknown column.
    pub fn create_index(&self, uri: &str, config: &IndexConfig) -> CoreResult<()> {
        self.with(|raw| Ok(raw.create(uri, &config.to_string())?))?;
        tracing::debug!(session = %self.id, uri, "index created");
        Ok(())
    }

    /// Drops a table or index.
    ///
    /// # Errors
    ///
    /// Fails with a busy error while the object has open cursors or
    /// uncommitted updates, unless `force` is set. Without `force`, a
    /// missing object is an error.
    pub fn drop_object(&self, uri: &str, config: &DropConfig) -> CoreResult<()> {
        self.with(|raw| Ok(raw.drop_object(uri, &config.to_string())?))?;
        tracing::debug!(session = %self.id, uri, force = config.force, "object dropped");
        Ok(())
    }

    /// Compacts a table or index.
    ///
    /// # Errors
    ///
    /// Fails inside a transaction or for a missing object.
    pub fn compact(&self, uri: &str, config: &CompactConfig) -> CoreResult<()> {
        self.with(|raw| Ok(raw.compact(uri, &config.to_string())?))
    }

    /// Closes the session.
    ///
    /// The first call deregisters the session from its connection and
    /// releases the handle. Later calls return `Ok(())` without touching
    /// the engine.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if releasing the handle fails.
    pub fn close(&mut self) -> CoreResult<()> {
        let Some(raw) = self.slot.take() else {
            return Ok(());
        };
        if let Some(connection) = self.connection.upgrade() {
            connection.deregister(self.id);
        }
        release(self.id, raw)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(session = %self.id, error = %err, "error closing session on drop");
        }
    }
}
