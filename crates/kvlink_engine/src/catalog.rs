//! Tables, indexes and open-cursor accounting.

use crate::error::{EngineError, EngineResult};
use crate::mvcc::{CommitSeq, ReadView, TxnId, VersionChain};
use crate::schema::{IndexSchema, TableSchema};
use crate::txn::{Txn, TxnManager};
use std::collections::BTreeMap;
use std::ops::Bound;

/// A visible record: stored key and stored value.
pub type Row = (Vec<u8>, Vec<u8>);

/// A table: schema plus multi-version rows keyed by stored key.
#[derive(Debug)]
pub struct Table {
    id: u64,
    schema: TableSchema,
    rows: BTreeMap<Vec<u8>, VersionChain>,
}

impl Table {
    fn new(id: u64, schema: TableSchema) -> Self {
        Self {
            id,
            schema,
            rows: BTreeMap::new(),
        }
    }

    /// Identifier unique to this incarnation of the table.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Table schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Value visible to `view` for a stored key.
    #[must_use]
    pub fn read(&self, key: &[u8], view: &ReadView) -> Option<&[u8]> {
        self.rows.get(key).and_then(|chain| chain.read(view))
    }

    /// First visible record after `after`, or the first record.
    #[must_use]
    pub fn next_visible(&self, after: Option<&[u8]>, view: &ReadView) -> Option<Row> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.rows
            .range::<[u8], _>((lower, Bound::Unbounded))
            .find_map(|(k, chain)| chain.read(view).map(|v| (k.clone(), v.to_vec())))
    }

    /// Last visible record before `before`, or the last record.
    #[must_use]
    pub fn prev_visible(&self, before: Option<&[u8]>, view: &ReadView) -> Option<Row> {
        let upper = before.map_or(Bound::Unbounded, Bound::Excluded);
        self.rows
            .range::<[u8], _>((Bound::Unbounded, upper))
            .rev()
            .find_map(|(k, chain)| chain.read(view).map(|v| (k.clone(), v.to_vec())))
    }

    /// Every record visible to `view`, in key order.
    #[must_use]
    pub fn visible_rows(&self, view: &ReadView) -> Vec<Row> {
        self.rows
            .iter()
            .filter_map(|(k, chain)| chain.read(view).map(|v| (k.clone(), v.to_vec())))
            .collect()
    }

    /// Writes a version owned by `txn`.
    ///
    /// A conflict dooms the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when another writer owns the key.
    pub fn write_txn(&mut self, key: &[u8], value: Option<Vec<u8>>, txn: &mut Txn) -> EngineResult<()> {
        let chain = self.rows.entry(key.to_vec()).or_default();
        if let Err(err) = chain.check_writable(&txn.view()) {
            txn.mark_failed();
            self.discard_if_empty(key);
            return Err(err);
        }
        chain.write(txn.id(), value);
        txn.record_write(&self.schema.name, key);
        Ok(())
    }

    /// Writes a version that commits immediately.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when a running transaction owns the key.
    pub fn write_autocommit(
        &mut self,
        key: &[u8],
        value: Option<Vec<u8>>,
        txns: &TxnManager,
    ) -> EngineResult<()> {
        let chain = self.rows.entry(key.to_vec()).or_default();
        if let Err(err) = chain.check_writable(&ReadView::committed()) {
            self.discard_if_empty(key);
            return Err(err);
        }
        chain.write_committed(value, txns.next_commit());
        Ok(())
    }

    /// Loads a committed record, used when restoring a checkpoint.
    pub fn restore(&mut self, key: Vec<u8>, value: Vec<u8>, commit: CommitSeq) {
        self.rows.insert(key, VersionChain::committed(value, commit));
    }

    /// Commits `txn`'s version of a key.
    pub fn stamp(&mut self, key: &[u8], txn: TxnId, commit: CommitSeq) {
        if let Some(chain) = self.rows.get_mut(key) {
            chain.stamp(txn, commit);
        }
    }

    /// Discards `txn`'s version of a key.
    pub fn abort(&mut self, key: &[u8], txn: TxnId) {
        if let Some(chain) = self.rows.get_mut(key) {
            chain.abort(txn);
        }
        self.discard_if_empty(key);
    }

    /// Returns true if any transaction has uncommitted writes here.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.rows.values().any(VersionChain::has_pending)
    }

    /// Removes versions older than `oldest`. Returns the number removed.
    pub fn prune(&mut self, oldest: CommitSeq) -> usize {
        let mut removed = 0;
        self.rows.retain(|_, chain| {
            removed += chain.prune(oldest);
            !chain.is_empty()
        });
        removed
    }

    /// Number of stored keys, including deleted and uncommitted ones.
    #[must_use]
    pub fn stored_keys(&self) -> usize {
        self.rows.len()
    }

    fn discard_if_empty(&mut self, key: &[u8]) {
        if self.rows.get(key).is_some_and(VersionChain::is_empty) {
            self.rows.remove(key);
        }
    }
}

/// Every table and index in a database, plus cursor counts per object.
#[derive(Debug, Default)]
pub struct Catalog {
    next_table_id: u64,
    tables: BTreeMap<String, Table>,
    indexes: BTreeMap<(String, String), IndexSchema>,
    open_cursors: BTreeMap<String, usize>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a table.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchObject` if the table does not exist.
    pub fn table(&self, name: &str) -> EngineResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| EngineError::no_such_object(format!("table:{name}")))
    }

    /// Looks up a table for writing.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchObject` if the table does not exist.
    pub fn table_mut(&mut self, name: &str) -> EngineResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| EngineError::no_such_object(format!("table:{name}")))
    }

    /// Looks up a table and checks it is the incarnation a cursor opened.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchObject` if the table was dropped since.
    pub fn table_incarnation(&self, name: &str, id: u64) -> EngineResult<&Table> {
        match self.tables.get(name) {
            Some(table) if table.id == id => Ok(table),
            _ => Err(EngineError::no_such_object(format!("table:{name}"))),
        }
    }

    /// Mutable variant of [`Catalog::table_incarnation`].
    ///
    /// # Errors
    ///
    /// Returns `NoSuchObject` if the table was dropped since.
    pub fn table_incarnation_mut(&mut self, name: &str, id: u64) -> EngineResult<&mut Table> {
        match self.tables.get_mut(name) {
            Some(table) if table.id == id => Ok(table),
            _ => Err(EngineError::no_such_object(format!("table:{name}"))),
        }
    }

    /// Iterates over tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Iterates over tables mutably.
    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.tables.values_mut()
    }

    /// Creates a table. Returns false if an identical table already exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a table with the same name but a
    /// different schema exists.
    pub fn create_table(&mut self, schema: TableSchema) -> EngineResult<bool> {
        if let Some(existing) = self.tables.get(&schema.name) {
            if existing.schema == schema {
                return Ok(false);
            }
            return Err(EngineError::invalid_argument(format!(
                "table '{}' already exists with configuration \"{}\"",
                schema.name,
                existing.schema.to_config()
            )));
        }
        self.next_table_id += 1;
        let table = Table::new(self.next_table_id, schema);
        self.tables.insert(table.schema.name.clone(), table);
        Ok(true)
    }

    /// Looks up an index.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchObject` if the index does not exist.
    pub fn index(&self, table: &str, name: &str) -> EngineResult<&IndexSchema> {
        self.indexes
            .get(&(table.to_string(), name.to_string()))
            .ok_or_else(|| EngineError::no_such_object(format!("index:{table}:{name}")))
    }

    /// Iterates over every index.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexSchema> {
        self.indexes.values()
    }

    /// Creates an index. Returns false if an identical index already exists.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchObject` if the table is missing and `InvalidArgument`
    /// if a different index with the same name exists.
    pub fn create_index(&mut self, schema: IndexSchema) -> EngineResult<bool> {
        self.table(&schema.table)?;
        let key = (schema.table.clone(), schema.name.clone());
        if let Some(existing) = self.indexes.get(&key) {
            if *existing == schema {
                return Ok(false);
            }
            return Err(EngineError::invalid_argument(format!(
                "index '{}' already exists on table '{}'",
                schema.name, schema.table
            )));
        }
        self.indexes.insert(key, schema);
        Ok(true)
    }

    /// Removes a table and its indexes.
    pub fn remove_table(&mut self, name: &str) -> Option<Table> {
        let table = self.tables.remove(name)?;
        self.indexes.retain(|(t, _), _| t != name);
        Some(table)
    }

    /// Removes an index.
    pub fn remove_index(&mut self, table: &str, name: &str) -> Option<IndexSchema> {
        self.indexes.remove(&(table.to_string(), name.to_string()))
    }

    /// Counts a cursor opened on `uri`.
    pub fn acquire_cursor(&mut self, uri: &str) {
        *self.open_cursors.entry(uri.to_string()).or_default() += 1;
    }

    /// Releases a cursor opened on `uri`.
    pub fn release_cursor(&mut self, uri: &str) {
        if let Some(count) = self.open_cursors.get_mut(uri) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.open_cursors.remove(uri);
            }
        }
    }

    /// Open cursors on a table and its indexes.
    #[must_use]
    pub fn cursors_on_table(&self, table: &str) -> usize {
        let index_prefix = format!("index:{table}:");
        let table_uri = format!("table:{table}");
        self.open_cursors
            .iter()
            .filter(|(uri, _)| **uri == table_uri || uri.starts_with(&index_prefix))
            .map(|(_, count)| *count)
            .sum()
    }

    /// Open cursors on exactly `uri`.
    #[must_use]
    pub fn cursors_on(&self, uri: &str) -> usize {
        self.open_cursors.get(uri).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigMap;
    use crate::mvcc::Isolation;

    fn schema(name: &str, config: &str) -> TableSchema {
        TableSchema::from_config(name, &ConfigMap::parse(config).unwrap()).unwrap()
    }

    fn populated() -> (Catalog, TxnManager) {
        let mut catalog = Catalog::new();
        let txns = TxnManager::new(0);
        catalog.create_table(schema("t", "")).unwrap();
        let table = catalog.table_mut("t").unwrap();
        for key in [b"b", b"d", b"f"] {
            table
                .write_autocommit(key, Some(key.to_vec()), &txns)
                .unwrap();
        }
        (catalog, txns)
    }

    #[test]
    fn create_is_idempotent_for_identical_schema() {
        let mut catalog = Catalog::new();
        assert!(catalog.create_table(schema("t", "")).unwrap());
        assert!(!catalog.create_table(schema("t", "key_format=S")).unwrap());
        assert!(catalog
            .create_table(schema("t", "value_format=u"))
            .is_err());
    }

    #[test]
    fn navigation_skips_invisible_rows() {
        let (mut catalog, txns) = populated();
        let table = catalog.table_mut("t").unwrap();
        let mut txn = txns.begin(Isolation::Snapshot, None);
        table.write_txn(b"c", Some(b"c".to_vec()), &mut txn).unwrap();

        let committed = ReadView::committed();
        let (key, _) = table.next_visible(Some(&b"b"[..]), &committed).unwrap();
        assert_eq!(key, b"d");
        let (key, _) = table.next_visible(Some(&b"b"[..]), &txn.view()).unwrap();
        assert_eq!(key, b"c");

        let (key, _) = table.prev_visible(None, &committed).unwrap();
        assert_eq!(key, b"f");
        assert!(table.prev_visible(Some(&b"b"[..]), &committed).is_none());
        assert_eq!(table.visible_rows(&committed).len(), 3);
    }

    #[test]
    fn conflicting_write_dooms_transaction() {
        let (mut catalog, txns) = populated();
        let table = catalog.table_mut("t").unwrap();
        let mut first = txns.begin(Isolation::Snapshot, None);
        let mut second = txns.begin(Isolation::Snapshot, None);

        table.write_txn(b"b", None, &mut first).unwrap();
        let err = table.write_txn(b"b", None, &mut second).unwrap_err();
        assert!(err.is_conflict());
        assert!(second.is_failed());
        assert!(table.write_autocommit(b"b", None, &txns).is_err());
        assert_eq!(table.stored_keys(), 3);
    }

    #[test]
    fn abort_removes_fresh_keys() {
        let (mut catalog, txns) = populated();
        let table = catalog.table_mut("t").unwrap();
        let mut txn = txns.begin(Isolation::Snapshot, None);
        table.write_txn(b"z", Some(b"z".to_vec()), &mut txn).unwrap();
        assert!(table.has_pending());
        table.abort(b"z", txn.id());
        assert!(!table.has_pending());
        assert_eq!(table.stored_keys(), 3);
    }

    #[test]
    fn drop_removes_indexes_and_counts_cursors() {
        let mut catalog = Catalog::new();
        catalog
            .create_table(schema("t", "columns=(id,data)"))
            .unwrap();
        let table = catalog.table("t").unwrap().schema().clone();
        let index = IndexSchema::from_config(&table, "i", &ConfigMap::parse("columns=(data)").unwrap())
            .unwrap();
        assert!(catalog.create_index(index.clone()).unwrap());
        assert!(!catalog.create_index(index).unwrap());

        catalog.acquire_cursor("index:t:i");
        catalog.acquire_cursor("table:t");
        catalog.acquire_cursor("table:tt");
        assert_eq!(catalog.cursors_on_table("t"), 2);
        catalog.release_cursor("index:t:i");
        assert_eq!(catalog.cursors_on_table("t"), 1);
        assert_eq!(catalog.cursors_on("index:t:i"), 0);

        assert!(catalog.remove_table("t").is_some());
        assert!(catalog.index("t", "i").is_err());
        assert!(catalog.table("t").is_err());
    }

    #[test]
    fn incarnation_changes_after_recreate() {
        let mut catalog = Catalog::new();
        catalog.create_table(schema("t", "")).unwrap();
        let first = catalog.table("t").unwrap().id();
        catalog.remove_table("t");
        catalog.create_table(schema("t", "")).unwrap();
        assert!(catalog.table_incarnation("t", first).is_err());
    }
}
