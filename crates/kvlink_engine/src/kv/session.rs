//! Engine sessions.

use super::cursor::{CursorOptions, SnapshotCursor, TableCursor};
use super::Shared;
use crate::api::{RawCursor, RawSession};
use crate::config::ConfigMap;
use crate::error::{EngineError, EngineResult};
use crate::mvcc::Isolation;
use crate::schema::{IndexSchema, TableSchema};
use crate::stats::Stat;
use crate::txn::Txn;
use crate::uri::ObjectUri;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const BEGIN_CONFIG_KEYS: &[&str] = &["isolation", "name", "priority", "sync", "operation_timeout_ms"];
const COMMIT_CONFIG_KEYS: &[&str] = &["sync", "operation_timeout_ms"];
const ROLLBACK_CONFIG_KEYS: &[&str] = &["operation_timeout_ms"];
const DROP_CONFIG_KEYS: &[&str] = &["force"];
const COMPACT_CONFIG_KEYS: &[&str] = &["timeout"];

/// Mutable state of one session, shared with its cursors.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) closed: bool,
    pub(crate) txn: Option<Txn>,
    isolation: Isolation,
    cursors: BTreeMap<u64, String>,
    next_cursor: u64,
}

impl SessionState {
    /// Registers a cursor and returns its id.
    pub(crate) fn register_cursor(&mut self, uri: &str) -> u64 {
        self.next_cursor += 1;
        self.cursors.insert(self.next_cursor, uri.to_string());
        self.next_cursor
    }

    /// Forgets a cursor. Returns its URI if it was still registered.
    pub(crate) fn release_cursor(&mut self, id: u64) -> Option<String> {
        self.cursors.remove(&id)
    }
}

/// Identity and state of a session.
#[derive(Debug)]
pub(crate) struct SessionCore {
    id: u64,
    state: Mutex<SessionState>,
}

impl SessionCore {
    pub(crate) fn new(id: u64, isolation: Isolation) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState {
                closed: false,
                txn: None,
                isolation,
                cursors: BTreeMap::new(),
                next_cursor: 0,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Locks the state of a live session on a live connection.
    pub(crate) fn enter(&self, shared: &Shared) -> EngineResult<MutexGuard<'_, SessionState>> {
        let state = self.state.lock();
        if state.closed || shared.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(state)
    }

    /// Locks the state whether or not the session is still open.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// Rolls back, releases cursors and marks the session closed.
    ///
    /// Returns false if the session was already closed.
    pub(crate) fn shutdown(&self, shared: &Shared) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        if let Some(txn) = state.txn.take() {
            tracing::debug!(session = self.id, txn = txn.id(), "rolling back transaction on close");
            rollback(shared, txn);
        }
        let cursors = std::mem::take(&mut state.cursors);
        if !cursors.is_empty() {
            let mut catalog = shared.catalog.write();
            for uri in cursors.values() {
                catalog.release_cursor(uri);
            }
        }
        shared.stats.record(Stat::SessionClose);
        true
    }
}

/// Discards a transaction's writes.
pub(crate) fn rollback(shared: &Shared, txn: Txn) {
    {
        let mut catalog = shared.catalog.write();
        for (table, key) in txn.writes() {
            if let Ok(table) = catalog.table_mut(table) {
                table.abort(key, txn.id());
            }
        }
    }
    shared.txns.finish(&txn);
    shared.stats.record(Stat::Rollback);
}

/// Makes a transaction's writes visible atomically.
fn commit(shared: &Shared, txn: Txn) -> EngineResult<()> {
    if txn.is_failed() {
        tracing::debug!(txn = txn.id(), "commit of conflicted transaction rolls back");
        rollback(shared, txn);
        return Err(EngineError::Conflict);
    }
    {
        let mut catalog = shared.catalog.write();
        if txn.writes().next().is_some() {
            let seq = shared.txns.next_commit();
            for (table, key) in txn.writes() {
                if let Ok(table) = catalog.table_mut(table) {
                    table.stamp(key, txn.id(), seq);
                }
            }
        }
    }
    shared.txns.finish(&txn);
    shared.stats.record(Stat::Commit);
    Ok(())
}

/// A session on a [`KvConnection`](super::KvConnection).
pub(crate) struct KvSession {
    shared: Arc<Shared>,
    core: Arc<SessionCore>,
}

impl KvSession {
    pub(crate) fn new(shared: Arc<Shared>, core: Arc<SessionCore>) -> Self {
        Self { shared, core }
    }

    fn create_table(&self, name: &str, config: &ConfigMap) -> EngineResult<()> {
        let schema = TableSchema::from_config(name, config)?;
        if let Some(compressor) = &schema.block_compressor {
            if !self.shared.extensions.read().has_compressor(compressor) {
                return Err(EngineError::invalid_config(format!(
                    "unknown block_compressor '{compressor}'; load its extension first"
                )));
            }
        }
        if self.shared.catalog.write().create_table(schema)? {
            tracing::debug!(session = self.core.id, table = name, "table created");
        }
        Ok(())
    }

    fn create_index(&self, table: &str, name: &str, config: &ConfigMap) -> EngineResult<()> {
        let mut catalog = self.shared.catalog.write();
        let table_schema = catalog.table(table)?.schema().clone();
        let schema = IndexSchema::from_config(&table_schema, name, config)?;
        if catalog.create_index(schema)? {
            tracing::debug!(session = self.core.id, table, index = name, "index created");
        }
        Ok(())
    }
}

impl RawSession for KvSession {
    fn native_id(&self) -> Option<String> {
        Some(self.core.id.to_string())
    }

    fn create(&self, uri: &str, config: &str) -> EngineResult<()> {
        let _state = self.core.enter(&self.shared)?;
        let config = ConfigMap::parse(config)?;
        match ObjectUri::parse(uri)? {
            ObjectUri::Table(name) => self.create_table(&name, &config),
            ObjectUri::Index { table, name } => self.create_index(&table, &name, &config),
            ObjectUri::Statistics => Err(EngineError::invalid_argument(
                "statistics: cannot be created",
            )),
        }
    }

    fn open_cursor(&self, uri: &str, config: &str) -> EngineResult<Box<dyn RawCursor>> {
        let mut state = self.core.enter(&self.shared)?;
        let options = CursorOptions::parse(config)?;
        let object = ObjectUri::parse(uri)?;

        let cursor: Box<dyn RawCursor> = match &object {
            ObjectUri::Table(name) => Box::new(TableCursor::open(
                Arc::clone(&self.shared),
                Arc::clone(&self.core),
                &mut state,
                name,
                options,
            )?),
            ObjectUri::Index { .. } | ObjectUri::Statistics => Box::new(SnapshotCursor::open(
                Arc::clone(&self.shared),
                Arc::clone(&self.core),
                &mut state,
                object.clone(),
                options,
            )?),
        };
        self.shared.stats.record(Stat::CursorOpen);
        tracing::debug!(session = self.core.id, uri, "cursor opened");
        Ok(cursor)
    }

    fn begin_transaction(&self, config: &str) -> EngineResult<()> {
        let mut state = self.core.enter(&self.shared)?;
        let config = ConfigMap::parse(config)?;
        config.ensure_only(BEGIN_CONFIG_KEYS, "begin_transaction")?;

        let isolation = match config.get_str("isolation")? {
            Some(name) => Isolation::parse(name)?,
            None => state.isolation,
        };
        if let Some(priority) = config.get_signed("priority")? {
            if !(-100..=100).contains(&priority) {
                return Err(EngineError::invalid_config(format!(
                    "priority {priority} outside -100..=100"
                )));
            }
        }
        config.get_bool("sync")?;
        config.get_int("operation_timeout_ms")?;

        if state.txn.is_some() {
            return Err(EngineError::invalid_argument("transaction already running"));
        }
        let txn = self
            .shared
            .txns
            .begin(isolation, config.get_str("name")?.map(str::to_string));
        tracing::debug!(
            session = self.core.id,
            txn = txn.id(),
            name = txn.name(),
            isolation = isolation.as_str(),
            "transaction started"
        );
        state.txn = Some(txn);
        self.shared.stats.record(Stat::Begin);
        Ok(())
    }

    fn commit_transaction(&self, config: &str) -> EngineResult<()> {
        let mut state = self.core.enter(&self.shared)?;
        let config = ConfigMap::parse(config)?;
        config.ensure_only(COMMIT_CONFIG_KEYS, "commit_transaction")?;
        config.get_bool("sync")?;
        config.get_int("operation_timeout_ms")?;

        let txn = state
            .txn
            .take()
            .ok_or_else(|| EngineError::invalid_argument("no transaction is running"))?;
        commit(&self.shared, txn)
    }

    fn rollback_transaction(&self, config: &str) -> EngineResult<()> {
        let mut state = self.core.enter(&self.shared)?;
        let config = ConfigMap::parse(config)?;
        config.ensure_only(ROLLBACK_CONFIG_KEYS, "rollback_transaction")?;
        config.get_int("operation_timeout_ms")?;

        let txn = state
            .txn
            .take()
            .ok_or_else(|| EngineError::invalid_argument("no transaction is running"))?;
        rollback(&self.shared, txn);
        Ok(())
    }

    fn drop_object(&self, uri: &str, config: &str) -> EngineResult<()> {
        let _state = self.core.enter(&self.shared)?;
        let config = ConfigMap::parse(config)?;
        config.ensure_only(DROP_CONFIG_KEYS, "drop")?;
        let force = config.get_bool("force")?.unwrap_or(false);

        let mut catalog = self.shared.catalog.write();
        match ObjectUri::parse(uri)? {
            ObjectUri::Table(name) => {
                let Ok(table) = catalog.table(&name) else {
                    return if force {
                        Ok(())
                    } else {
                        Err(EngineError::no_such_object(uri))
                    };
                };
                if !force {
                    let cursors = catalog.cursors_on_table(&name);
                    if cursors > 0 {
                        return Err(EngineError::busy(format!("{uri} has {cursors} open cursors")));
                    }
                    if table.has_pending() {
                        return Err(EngineError::busy(format!(
                            "{uri} has uncommitted updates"
                        )));
                    }
                }
                catalog.remove_table(&name);
            }
            ObjectUri::Index { table, name } => {
                if catalog.index(&table, &name).is_err() {
                    return if force {
                        Ok(())
                    } else {
                        Err(EngineError::no_such_object(uri))
                    };
                }
                if !force && catalog.cursors_on(uri) > 0 {
                    return Err(EngineError::busy(format!("{uri} has open cursors")));
                }
                catalog.remove_index(&table, &name);
            }
            ObjectUri::Statistics => {
                return Err(EngineError::invalid_argument("statistics: cannot be dropped"))
            }
        }
        tracing::debug!(session = self.core.id, uri, force, "object dropped");
        Ok(())
    }

    fn compact(&self, uri: &str, config: &str) -> EngineResult<()> {
        let state = self.core.enter(&self.shared)?;
        let config = ConfigMap::parse(config)?;
        config.ensure_only(COMPACT_CONFIG_KEYS, "compact")?;
        config.get_int("timeout")?;
        if state.txn.is_some() {
            return Err(EngineError::invalid_argument(
                "compact is not permitted in a transaction",
            ));
        }

        let object = ObjectUri::parse(uri)?;
        let mut catalog = self.shared.catalog.write();
        let pruned = match &object {
            ObjectUri::Table(name) => {
                let oldest = self.shared.txns.oldest_snapshot();
                catalog.table_mut(name)?.prune(oldest)
            }
            ObjectUri::Index { table, name } => {
                catalog.index(table, name)?;
                0
            }
            ObjectUri::Statistics => {
                return Err(EngineError::invalid_argument("statistics: cannot be compacted"))
            }
        };
        self.shared.stats.record_pruned(pruned);
        tracing::debug!(session = self.core.id, uri, pruned, "compacted");
        Ok(())
    }

    fn close(&mut self, config: &str) -> EngineResult<()> {
        ConfigMap::parse(config)?.ensure_only(&[], "session close")?;
        if self.core.shutdown(&self.shared) {
            self.shared.sessions.lock().remove(&self.core.id);
            tracing::debug!(session = self.core.id, "engine session closed");
        }
        Ok(())
    }
}

impl Drop for KvSession {
    fn drop(&mut self) {
        if self.core.shutdown(&self.shared) {
            self.shared.sessions.lock().remove(&self.core.id);
        }
    }
}
