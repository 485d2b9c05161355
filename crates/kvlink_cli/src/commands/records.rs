//! Record commands: put, get, delete and scan.

use super::connect_existing;
use kvlink_core::{CursorConfig, Record};
use serde::Serialize;
use std::path::Path;

/// One record in JSON output.
#[derive(Debug, Serialize)]
pub struct ScanEntry {
    /// Record key.
    pub key: String,
    /// Record value.
    pub value: String,
}

impl From<Record> for ScanEntry {
    fn from(record: Record) -> Self {
        Self {
            key: record.key,
            value: record.value,
        }
    }
}

/// Scan result.
#[derive(Debug, Serialize)]
pub struct ScanResult {
    /// Table URI.
    pub uri: String,
    /// Records in scan order.
    pub records: Vec<ScanEntry>,
    /// True if `--limit` cut the scan short.
    pub truncated: bool,
}

fn table_uri(table: &str) -> String {
    if table.contains(':') {
        table.to_string()
    } else {
        format!("table:{table}")
    }
}

/// Runs the put command.
pub fn put(
    home: &Path,
    table: &str,
    key: &str,
    value: &str,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let conn = connect_existing(home)?;
    let session = conn.open_session()?;
    let mut cursor =
        session.open_cursor_with_config(&table_uri(table), &CursorConfig::new().overwrite(overwrite))?;
    cursor.set(key, value)?;
    match cursor.insert() {
        Err(err) if err.is_duplicate_key() => {
            return Err(format!("Key {key:?} already exists (use --overwrite to replace it)").into());
        }
        result => result?,
    }
    cursor.close()?;
    Ok(())
}

/// Runs the get command.
pub fn get(home: &Path, table: &str, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conn = connect_existing(home)?;
    let session = conn.open_session()?;
    let mut cursor = session.open_cursor_with_config(&table_uri(table), &CursorConfig::new())?;
    match cursor.search(key)? {
        Some(value) => println!("{value}"),
        None => return Err(format!("Key {key:?} not found").into()),
    }
    Ok(())
}

/// Runs the delete command.
pub fn delete(home: &Path, table: &str, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conn = connect_existing(home)?;
    let session = conn.open_session()?;
    let mut cursor = session.open_cursor_with_config(&table_uri(table), &CursorConfig::new())?;
    cursor.set_key(key)?;
    if cursor.remove()? {
        println!("Deleted {key:?}");
    } else {
        println!("Key {key:?} not found");
    }
    Ok(())
}

/// Runs the scan command.
pub fn scan(
    home: &Path,
    table: &str,
    reverse: bool,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let uri = table_uri(table);
    let conn = connect_existing(home)?;
    let session = conn.open_session()?;
    let mut cursor = session.open_cursor_with_config(&uri, &CursorConfig::new().readonly(true))?;

    let limit = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    let mut truncated = false;
    loop {
        let record = if reverse { cursor.prev()? } else { cursor.next()? };
        let Some(record) = record else {
            break;
        };
        if records.len() == limit {
            truncated = true;
            break;
        }
        records.push(ScanEntry::from(record));
    }

    let result = ScanResult {
        uri,
        records,
        truncated,
    };
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            for entry in &result.records {
                println!("{}\t{}", entry.key, entry.value);
            }
            if result.truncated {
                println!("... (limit reached)");
            }
        }
    }
    Ok(())
}
