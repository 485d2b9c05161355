//! CLI command implementations.

pub mod maintenance;
pub mod records;
pub mod tables;

use kvlink_core::{Connection, ConnectionConfig, CoreResult};
use std::path::Path;

/// Opens the database at `home`, creating it if needed.
pub fn connect(home: &Path, config: ConnectionConfig) -> CoreResult<Connection> {
    tracing::debug!(home = %home.display(), config = %config, "opening database");
    let conn = Connection::new();
    conn.open(home, &config)?;
    Ok(conn)
}

/// Opens an existing database at `home`.
pub fn connect_existing(home: &Path) -> CoreResult<Connection> {
    connect(home, ConnectionConfig::new().create(false))
}
