//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use kvlink_core::{Connection, ConnectionConfig, ExtensionDiscovery, TableConfig};
use std::path::Path;
use tempfile::TempDir;

/// A test database with automatic cleanup.
///
/// Extension discovery is disabled so results do not depend on the host.
pub struct TestDatabase {
    /// The open connection.
    pub conn: Connection,
    /// The temporary home (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestDatabase {
    /// Creates a database in a fresh temporary directory.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a database with a custom connection configuration.
    pub fn with_config(config: ConnectionConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let conn = Connection::new();
        conn.open(temp_dir.path(), &config)
            .expect("Failed to open test database");
        Self { conn, temp_dir }
    }

    /// The database home directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the connection and opens a new one on the same home.
    pub fn reopen(&mut self) {
        self.conn.close().expect("Failed to close test database");
        let conn = Connection::new();
        conn.open(self.temp_dir.path(), &test_config().create(false))
            .expect("Failed to reopen test database");
        self.conn = conn;
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

/// The connection configuration fixtures use.
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig::new().extensions(ExtensionDiscovery::disabled())
}

/// Runs a test with a temporary database.
///
/// # Example
///
/// ```rust
/// use kvlink_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     assert!(db.is_open());
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Connection) -> R,
{
    let test_db = TestDatabase::new();
    f(&test_db.conn)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Name of the table the scenarios populate.
    pub const TABLE: &str = "test";

    /// Key stored at position `i` by [`populated_database`].
    pub fn key(i: usize) -> String {
        format!("key{i:06}")
    }

    /// Creates a database whose `test` table holds `count` records.
    ///
    /// Keys come from [`key`]; each value is the decimal index.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::new();
        let session = test_db.open_session().expect("Failed to open session");
        session
            .create_table(TABLE, &TableConfig::new())
            .expect("Failed to create table");
        let mut cursor = session.open_cursor(TABLE).expect("Failed to open cursor");
        for i in 0..count {
            cursor.set(&key(i), &i.to_string()).expect("Failed to stage record");
            cursor.insert().expect("Failed to insert record");
        }
        drop(cursor);
        drop(session);
        test_db
    }

    /// Creates a database holding `table_count` empty tables.
    pub fn multi_table_database(table_count: usize) -> (TestDatabase, Vec<String>) {
        let test_db = TestDatabase::new();
        let session = test_db.open_session().expect("Failed to open session");
        let names: Vec<String> = (0..table_count).map(|i| format!("table_{i}")).collect();
        for name in &names {
            session
                .create_table(name, &TableConfig::new())
                .expect("Failed to create table");
        }
        drop(session);
        (test_db, names)
    }
}
