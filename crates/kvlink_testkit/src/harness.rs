//! Model-checking harness.
//!
//! Applies cursor operations to a real table and to a `BTreeMap` side by
//! side, asserting that each operation's outcome and the final contents
//! agree.

use crate::fixtures::TestDatabase;
use crate::generators::CursorOperation;
use kvlink_core::{CoreResult, Session, TableConfig};
use std::collections::BTreeMap;

/// A table paired with the map it should match.
pub struct ModelHarness {
    /// The database under test.
    pub db: TestDatabase,
    session: Session,
    table: String,
    model: BTreeMap<String, String>,
}

impl ModelHarness {
    /// Creates a harness over a fresh table.
    pub fn new(table: &str) -> Self {
        let db = TestDatabase::new();
        let session = db.open_session().expect("Failed to open session");
        session
            .create_table(table, &TableConfig::new())
            .expect("Failed to create table");
        Self {
            db,
            session,
            table: table.to_string(),
            model: BTreeMap::new(),
        }
    }

    /// The session operations run in.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The expected contents.
    pub fn model(&self) -> &BTreeMap<String, String> {
        &self.model
    }

    /// Applies one operation to both sides and checks the outcome.
    pub fn apply(&mut self, op: &CursorOperation) {
        let mut cursor = self
            .session
            .open_cursor(&self.table)
            .expect("Failed to open cursor");
        match op {
            CursorOperation::Insert { key, value } => {
                cursor.set(key, value).expect("Failed to stage record");
                let result = cursor.insert();
                if self.model.contains_key(key) {
                    assert!(
                        result.is_err_and(|err| err.is_duplicate_key()),
                        "insert of existing key {key:?} should fail"
                    );
                } else {
                    result.expect("Failed to insert");
                    self.model.insert(key.clone(), value.clone());
                }
            }
            CursorOperation::Update { key, value } => {
                cursor.set(key, value).expect("Failed to stage record");
                let result = cursor.update();
                if self.model.contains_key(key) {
                    result.expect("Failed to update");
                    self.model.insert(key.clone(), value.clone());
                } else {
                    assert!(
                        result.is_err_and(|err| err.is_not_found()),
                        "update of missing key {key:?} should fail"
                    );
                }
            }
            CursorOperation::Remove { key } => {
                cursor.set_key(key).expect("Failed to stage key");
                let removed = cursor.remove().expect("Failed to remove");
                assert_eq!(removed, self.model.remove(key).is_some(), "remove of {key:?}");
            }
            CursorOperation::Search { key } => {
                let found = cursor.search(key).expect("Failed to search");
                assert_eq!(found.as_ref(), self.model.get(key), "search for {key:?}");
            }
        }
    }

    /// Runs `f` inside a transaction, then rolls it back.
    ///
    /// The model is left untouched, so [`ModelHarness::verify_all`]
    /// checks that the rollback hid every change.
    pub fn apply_rolled_back(&mut self, ops: &[CursorOperation]) {
        self.session
            .begin_transaction()
            .expect("Failed to begin transaction");
        let saved = self.model.clone();
        for op in ops {
            self.apply(op);
        }
        self.model = saved;
        self.session
            .rollback_transaction()
            .expect("Failed to roll back transaction");
    }

    /// Reads the whole table in key order.
    pub fn scan(&self) -> CoreResult<Vec<(String, String)>> {
        let mut cursor = self.session.open_cursor(&self.table)?;
        let mut records = Vec::new();
        while let Some(record) = cursor.next()? {
            records.push((record.key, record.value));
        }
        Ok(records)
    }

    /// Reads the whole table from the last key to the first.
    pub fn scan_reverse(&self) -> CoreResult<Vec<(String, String)>> {
        let mut cursor = self.session.open_cursor(&self.table)?;
        let mut records = Vec::new();
        while let Some(record) = cursor.prev()? {
            records.push((record.key, record.value));
        }
        Ok(records)
    }

    /// Verifies that the table holds exactly the modelled records.
    pub fn verify_all(&self) {
        let expected: Vec<(String, String)> = self
            .model
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(self.scan().expect("Failed to scan"), expected);

        let mut reversed = expected;
        reversed.reverse();
        assert_eq!(self.scan_reverse().expect("Failed to scan"), reversed);
    }

    /// Returns the count of tracked records.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }
}
