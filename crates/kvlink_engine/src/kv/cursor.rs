//! Engine cursors.
//!
//! [`TableCursor`] reads and writes a table through the session's read view.
//! [`SnapshotCursor`] serves read-only sources (indexes and statistics) from
//! a copy captured when the cursor is opened or reset.

use super::session::{SessionCore, SessionState};
use super::Shared;
use crate::api::RawCursor;
use crate::catalog::{Row, Table};
use crate::config::ConfigMap;
use crate::error::{EngineError, EngineResult};
use crate::mvcc::ReadView;
use crate::schema::{Column, Format};
use crate::stats::{Stat, StatisticsLevel};
use crate::txn::Txn;
use crate::uri::ObjectUri;
use parking_lot::MutexGuard;
use std::sync::Arc;

const CURSOR_CONFIG_KEYS: &[&str] = &["raw", "overwrite", "readonly"];

/// Options resolved from a cursor configuration string.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CursorOptions {
    raw: bool,
    overwrite: bool,
    readonly: bool,
}

impl CursorOptions {
    pub(crate) fn parse(config: &str) -> EngineResult<Self> {
        let map = ConfigMap::parse(config)?;
        map.ensure_only(CURSOR_CONFIG_KEYS, "cursor")?;
        Ok(Self {
            raw: map.get_bool("raw")?.unwrap_or(false),
            overwrite: map.get_bool("overwrite")?.unwrap_or(false),
            readonly: map.get_bool("readonly")?.unwrap_or(false),
        })
    }
}

fn view_of(state: &SessionState) -> ReadView {
    state
        .txn
        .as_ref()
        .map_or_else(ReadView::committed, Txn::view)
}

fn encode_item(format: Format, raw: bool, item: &[u8]) -> EngineResult<Vec<u8>> {
    if raw {
        format.validate_packed(item)?;
        Ok(item.to_vec())
    } else {
        format.pack(item)
    }
}

fn decode_item(format: Format, raw: bool, stored: &[u8]) -> Vec<u8> {
    if raw {
        stored.to_vec()
    } else {
        format.unpack(stored)
    }
}

fn key_not_set() -> EngineError {
    EngineError::invalid_argument("cursor key not set")
}

/// Registration of a cursor with its session and the catalog.
struct CursorHandle {
    shared: Arc<Shared>,
    session: Arc<SessionCore>,
    id: u64,
    uri: String,
    closed: bool,
}

impl CursorHandle {
    fn register(
        shared: Arc<Shared>,
        session: Arc<SessionCore>,
        state: &mut SessionState,
        uri: String,
    ) -> Self {
        shared.catalog.write().acquire_cursor(&uri);
        let id = state.register_cursor(&uri);
        Self {
            shared,
            session,
            id,
            uri,
            closed: false,
        }
    }

    fn enter(&self) -> EngineResult<MutexGuard<'_, SessionState>> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        self.session.enter(&self.shared)
    }

    fn ensure_live(&self) -> EngineResult<()> {
        self.enter().map(drop)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.session.lock_state();
        if state.closed {
            return;
        }
        if let Some(uri) = state.release_cursor(self.id) {
            self.shared.catalog.write().release_cursor(&uri);
        }
    }
}

impl Drop for CursorHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug)]
struct Position {
    key: Vec<u8>,
    /// `None` once the record under the cursor was removed.
    value: Option<Vec<u8>>,
}

/// A read-write cursor over a table.
pub(crate) struct TableCursor {
    handle: CursorHandle,
    table: String,
    table_id: u64,
    key_format: Format,
    value_format: Format,
    options: CursorOptions,
    key: Option<Vec<u8>>,
    value: Option<Vec<u8>>,
    position: Option<Position>,
}

impl TableCursor {
    pub(crate) fn open(
        shared: Arc<Shared>,
        session: Arc<SessionCore>,
        state: &mut SessionState,
        name: &str,
        options: CursorOptions,
    ) -> EngineResult<Self> {
        let (table_id, key_format, value_format) = {
            let catalog = shared.catalog.read();
            let table = catalog.table(name)?;
            if let Some(compressor) = &table.schema().block_compressor {
                if !shared.extensions.read().has_compressor(compressor) {
                    return Err(EngineError::invalid_config(format!(
                        "table '{name}' uses block_compressor '{compressor}' which is not loaded"
                    )));
                }
            }
            (
                table.id(),
                table.schema().key_format,
                table.schema().value_format,
            )
        };

        Ok(Self {
            handle: CursorHandle::register(shared, session, state, format!("table:{name}")),
            table: name.to_string(),
            table_id,
            key_format,
            value_format,
            options,
            key: None,
            value: None,
            position: None,
        })
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        if self.options.readonly {
            return Err(EngineError::not_supported(format!(
                "cursor on {} is read-only",
                self.handle.uri
            )));
        }
        Ok(())
    }

    fn staged_pair(&self) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        let key = self.key.clone().ok_or_else(key_not_set)?;
        let value = self
            .value
            .clone()
            .ok_or_else(|| EngineError::invalid_argument("cursor value not set"))?;
        Ok((key, value))
    }

    fn clear_staged(&mut self) {
        self.key = None;
        self.value = None;
    }
}

/// Writes one row as part of the session's transaction, or autocommits it.
fn write_row(
    shared: &Shared,
    table: &mut Table,
    txn: Option<&mut Txn>,
    key: &[u8],
    value: Option<Vec<u8>>,
) -> EngineResult<()> {
    let result = match txn {
        Some(txn) => table.write_txn(key, value, txn),
        None => table.write_autocommit(key, value, &shared.txns),
    };
    if matches!(result, Err(EngineError::Conflict)) {
        shared.stats.record(Stat::Conflict);
    }
    result
}

fn ensure_not_doomed(state: &SessionState) -> EngineResult<()> {
    if state.txn.as_ref().is_some_and(Txn::is_failed) {
        return Err(EngineError::Conflict);
    }
    Ok(())
}

impl RawCursor for TableCursor {
    fn uri(&self) -> &str {
        &self.handle.uri
    }

    fn set_key(&mut self, key: &[u8]) -> EngineResult<()> {
        self.handle.ensure_live()?;
        match encode_item(self.key_format, self.options.raw, key) {
            Ok(item) => {
                self.key = Some(item);
                Ok(())
            }
            Err(err) => {
                // A rejected item discards the whole staged pair.
                self.clear_staged();
                Err(err)
            }
        }
    }

    fn set_value(&mut self, value: &[u8]) -> EngineResult<()> {
        self.handle.ensure_live()?;
        match encode_item(self.value_format, self.options.raw, value) {
            Ok(item) => {
                self.value = Some(item);
                Ok(())
            }
            Err(err) => {
                // A rejected item discards the whole staged pair.
                self.clear_staged();
                Err(err)
            }
        }
    }

    fn get_key(&self) -> EngineResult<Vec<u8>> {
        self.handle.ensure_live()?;
        self.position
            .as_ref()
            .map(|p| decode_item(self.key_format, self.options.raw, &p.key))
            .ok_or(EngineError::NotPositioned)
    }

    fn get_value(&self) -> EngineResult<Vec<u8>> {
        self.handle.ensure_live()?;
        self.position
            .as_ref()
            .and_then(|p| p.value.as_deref())
            .map(|v| decode_item(self.value_format, self.options.raw, v))
            .ok_or(EngineError::NotPositioned)
    }

    fn next(&mut self) -> EngineResult<()> {
        let found = {
            let state = self.handle.enter()?;
            let catalog = self.handle.shared.catalog.read();
            let table = catalog.table_incarnation(&self.table, self.table_id)?;
            let after = self.position.as_ref().map(|p| p.key.as_slice());
            table.next_visible(after, &view_of(&state))
        };
        self.handle.shared.stats.record(Stat::Next);
        self.clear_staged();
        match found {
            Some((key, value)) => {
                self.position = Some(Position {
                    key,
                    value: Some(value),
                });
                Ok(())
            }
            None => {
                self.position = None;
                Err(EngineError::NotFound)
            }
        }
    }

    fn prev(&mut self) -> EngineResult<()> {
        let found = {
            let state = self.handle.enter()?;
            let catalog = self.handle.shared.catalog.read();
            let table = catalog.table_incarnation(&self.table, self.table_id)?;
            let before = self.position.as_ref().map(|p| p.key.as_slice());
            table.prev_visible(before, &view_of(&state))
        };
        self.handle.shared.stats.record(Stat::Prev);
        self.clear_staged();
        match found {
            Some((key, value)) => {
                self.position = Some(Position {
                    key,
                    value: Some(value),
                });
                Ok(())
            }
            None => {
                self.position = None;
                Err(EngineError::NotFound)
            }
        }
    }

    fn reset(&mut self) -> EngineResult<()> {
        self.handle.ensure_live()?;
        self.position = None;
        self.clear_staged();
        Ok(())
    }

    fn search(&mut self) -> EngineResult<()> {
        let key = self.key.clone().ok_or_else(key_not_set)?;
        let found = {
            let state = self.handle.enter()?;
            let catalog = self.handle.shared.catalog.read();
            let table = catalog.table_incarnation(&self.table, self.table_id)?;
            table.read(&key, &view_of(&state)).map(<[u8]>::to_vec)
        };
        self.handle.shared.stats.record(Stat::Search);
        match found {
            Some(value) => {
                self.position = Some(Position {
                    key,
                    value: Some(value),
                });
                self.clear_staged();
                Ok(())
            }
            None => {
                self.position = None;
                Err(EngineError::NotFound)
            }
        }
    }

    fn search_near(&mut self) -> EngineResult<i32> {
        let key = self.key.clone().ok_or_else(key_not_set)?;
        let found = {
            let state = self.handle.enter()?;
            let view = view_of(&state);
            let catalog = self.handle.shared.catalog.read();
            let table = catalog.table_incarnation(&self.table, self.table_id)?;
            if let Some(value) = table.read(&key, &view) {
                Some((key.clone(), value.to_vec(), 0))
            } else if let Some((k, v)) = table.next_visible(Some(&key), &view) {
                Some((k, v, 1))
            } else {
                table.prev_visible(Some(&key), &view).map(|(k, v)| (k, v, -1))
            }
        };
        self.handle.shared.stats.record(Stat::Search);
        match found {
            Some((key, value, exact)) => {
                self.position = Some(Position {
                    key,
                    value: Some(value),
                });
                self.clear_staged();
                Ok(exact)
            }
            None => {
                self.position = None;
                Err(EngineError::NotFound)
            }
        }
    }

    fn insert(&mut self) -> EngineResult<()> {
        self.ensure_writable()?;
        let (key, value) = self.staged_pair()?;
        {
            let mut state = self.handle.enter()?;
            ensure_not_doomed(&state)?;
            let view = view_of(&state);
            let shared = &self.handle.shared;
            let mut catalog = shared.catalog.write();
            let table = catalog.table_incarnation_mut(&self.table, self.table_id)?;
            if !self.options.overwrite && table.read(&key, &view).is_some() {
                return Err(EngineError::DuplicateKey);
            }
            write_row(shared, table, state.txn.as_mut(), &key, Some(value))?;
        }
        self.handle.shared.stats.record(Stat::Insert);
        self.position = None;
        self.clear_staged();
        Ok(())
    }

    fn update(&mut self) -> EngineResult<()> {
        self.ensure_writable()?;
        let (key, value) = self.staged_pair()?;
        {
            let mut state = self.handle.enter()?;
            ensure_not_doomed(&state)?;
            let view = view_of(&state);
            let shared = &self.handle.shared;
            let mut catalog = shared.catalog.write();
            let table = catalog.table_incarnation_mut(&self.table, self.table_id)?;
            if !self.options.overwrite && table.read(&key, &view).is_none() {
                return Err(EngineError::NotFound);
            }
            write_row(shared, table, state.txn.as_mut(), &key, Some(value.clone()))?;
        }
        self.handle.shared.stats.record(Stat::Update);
        self.position = Some(Position {
            key,
            value: Some(value),
        });
        self.clear_staged();
        Ok(())
    }

    fn remove(&mut self) -> EngineResult<()> {
        self.ensure_writable()?;
        let (key, positioned) = match (&self.key, &self.position) {
            (Some(key), _) => (key.clone(), false),
            (None, Some(position)) => (position.key.clone(), true),
            (None, None) => return Err(key_not_set()),
        };
        let removed = {
            let mut state = self.handle.enter()?;
            ensure_not_doomed(&state)?;
            let view = view_of(&state);
            let shared = &self.handle.shared;
            let mut catalog = shared.catalog.write();
            let table = catalog.table_incarnation_mut(&self.table, self.table_id)?;
            if table.read(&key, &view).is_some() {
                write_row(shared, table, state.txn.as_mut(), &key, None)?;
                true
            } else {
                false
            }
        };
        if !removed && !self.options.overwrite {
            if !positioned {
                self.position = None;
            }
            return Err(EngineError::NotFound);
        }

        self.handle.shared.stats.record(Stat::Remove);
        if positioned {
            if let Some(position) = self.position.as_mut() {
                position.value = None;
            }
        } else {
            self.position = None;
        }
        self.clear_staged();
        Ok(())
    }

    fn close(&mut self) -> EngineResult<()> {
        self.handle.close();
        self.position = None;
        self.clear_staged();
        Ok(())
    }
}

/// A read-only cursor over a captured copy of an index or the statistics.
pub(crate) struct SnapshotCursor {
    handle: CursorHandle,
    object: ObjectUri,
    key_format: Format,
    value_format: Format,
    raw: bool,
    entries: Vec<Row>,
    position: Option<usize>,
    key: Option<Vec<u8>>,
}

impl SnapshotCursor {
    pub(crate) fn open(
        shared: Arc<Shared>,
        session: Arc<SessionCore>,
        state: &mut SessionState,
        object: ObjectUri,
        options: CursorOptions,
    ) -> EngineResult<Self> {
        let (key_format, value_format) = match &object {
            ObjectUri::Index { table, name } => {
                let catalog = shared.catalog.read();
                let index = catalog.index(table, name)?;
                let schema = catalog.table(table)?.schema();
                (schema.format_of(index.column), schema.value_format)
            }
            ObjectUri::Statistics => {
                if shared.statistics == StatisticsLevel::None {
                    return Err(EngineError::invalid_argument(
                        "statistics cursors require statistics to be enabled",
                    ));
                }
                (Format::String, Format::String)
            }
            ObjectUri::Table(_) => {
                return Err(EngineError::invalid_argument(
                    "tables are read through table cursors",
                ))
            }
        };
        let entries = capture(&shared, &object, &view_of(state))?;

        Ok(Self {
            handle: CursorHandle::register(shared, session, state, object.to_string()),
            object,
            key_format,
            value_format,
            raw: options.raw,
            entries,
            position: None,
            key: None,
        })
    }

    fn read_only(&self) -> EngineError {
        EngineError::not_supported(format!("cursor on {} is read-only", self.handle.uri))
    }

    fn lower_bound(&self, key: &[u8]) -> usize {
        self.entries.partition_point(|(k, _)| k.as_slice() < key)
    }

    fn current(&self) -> EngineResult<&Row> {
        self.position
            .and_then(|idx| self.entries.get(idx))
            .ok_or(EngineError::NotPositioned)
    }
}

/// Copies the records a read-only source exposes, sorted by key.
fn capture(shared: &Shared, object: &ObjectUri, view: &ReadView) -> EngineResult<Vec<Row>> {
    match object {
        ObjectUri::Index { table, name } => {
            let catalog = shared.catalog.read();
            let index = catalog.index(table, name)?;
            let rows = catalog.table(table)?.visible_rows(view);
            let mut entries: Vec<Row> = match index.column {
                Column::Key => rows,
                Column::Value => rows.into_iter().map(|(_, v)| (v.clone(), v)).collect(),
            };
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(entries)
        }
        ObjectUri::Statistics => shared
            .statistics_snapshot()?
            .into_iter()
            .map(|(name, value)| {
                Ok((
                    Format::String.pack(name.as_bytes())?,
                    Format::String.pack(value.to_string().as_bytes())?,
                ))
            })
            .collect(),
        ObjectUri::Table(_) => Ok(Vec::new()),
    }
}

impl RawCursor for SnapshotCursor {
    fn uri(&self) -> &str {
        &self.handle.uri
    }

    fn set_key(&mut self, key: &[u8]) -> EngineResult<()> {
        self.handle.ensure_live()?;
        self.key = None;
        self.key = Some(encode_item(self.key_format, self.raw, key)?);
        Ok(())
    }

    fn set_value(&mut self, _value: &[u8]) -> EngineResult<()> {
        self.handle.ensure_live()?;
        Err(self.read_only())
    }

    fn get_key(&self) -> EngineResult<Vec<u8>> {
        self.handle.ensure_live()?;
        let (key, _) = self.current()?;
        Ok(decode_item(self.key_format, self.raw, key))
    }

    fn get_value(&self) -> EngineResult<Vec<u8>> {
        self.handle.ensure_live()?;
        let (_, value) = self.current()?;
        Ok(decode_item(self.value_format, self.raw, value))
    }

    fn next(&mut self) -> EngineResult<()> {
        self.handle.ensure_live()?;
        self.handle.shared.stats.record(Stat::Next);
        self.key = None;
        let next = self.position.map_or(0, |idx| idx + 1);
        if next < self.entries.len() {
            self.position = Some(next);
            Ok(())
        } else {
            self.position = None;
            Err(EngineError::NotFound)
        }
    }

    fn prev(&mut self) -> EngineResult<()> {
        self.handle.ensure_live()?;
        self.handle.shared.stats.record(Stat::Prev);
        self.key = None;
        let prev = match self.position {
            None => self.entries.len().checked_sub(1),
            Some(idx) => idx.checked_sub(1),
        };
        self.position = prev;
        prev.map(|_| ()).ok_or(EngineError::NotFound)
    }

    fn reset(&mut self) -> EngineResult<()> {
        let entries = {
            let state = self.handle.enter()?;
            capture(&self.handle.shared, &self.object, &view_of(&state))?
        };
        self.entries = entries;
        self.position = None;
        self.key = None;
        Ok(())
    }

    fn search(&mut self) -> EngineResult<()> {
        let key = self.key.clone().ok_or_else(key_not_set)?;
        self.handle.ensure_live()?;
        self.handle.shared.stats.record(Stat::Search);
        let idx = self.lower_bound(&key);
        if self.entries.get(idx).is_some_and(|(k, _)| *k == key) {
            self.position = Some(idx);
            self.key = None;
            Ok(())
        } else {
            self.position = None;
            Err(EngineError::NotFound)
        }
    }

    fn search_near(&mut self) -> EngineResult<i32> {
        let key = self.key.clone().ok_or_else(key_not_set)?;
        self.handle.ensure_live()?;
        self.handle.shared.stats.record(Stat::Search);
        let idx = self.lower_bound(&key);
        let (position, exact) = match self.entries.get(idx) {
            Some((k, _)) if *k == key => (idx, 0),
            Some(_) => (idx, 1),
            None if idx > 0 => (idx - 1, -1),
            None => {
                self.position = None;
                return Err(EngineError::NotFound);
            }
        };
        self.position = Some(position);
        self.key = None;
        Ok(exact)
    }

    fn insert(&mut self) -> EngineResult<()> {
        Err(self.read_only())
    }

    fn update(&mut self) -> EngineResult<()> {
        Err(self.read_only())
    }

    fn remove(&mut self) -> EngineResult<()> {
        Err(self.read_only())
    }

    fn close(&mut self) -> EngineResult<()> {
        self.handle.close();
        self.entries.clear();
        self.position = None;
        Ok(())
    }
}
