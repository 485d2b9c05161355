//! Table commands: create and drop.

use super::{connect, connect_existing};
use kvlink_core::{ConnectionConfig, DropConfig, TableConfig};
use std::path::Path;

/// Runs the create-table command.
pub fn create(home: &Path, name: &str, config: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config: TableConfig = match config {
        Some(text) => text.parse()?,
        None => TableConfig::new(),
    };

    let conn = connect(home, ConnectionConfig::new())?;
    let session = conn.open_session()?;
    session.create_table(name, &config)?;
    println!("Created table:{name} ({config})");
    Ok(())
}

/// Runs the drop command.
pub fn drop(home: &Path, uri: &str, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = connect_existing(home)?;
    let session = conn.open_session()?;
    session.drop_object(uri, &DropConfig::new().force(force))?;
    println!("Dropped {uri}");
    Ok(())
}
