//! Maintenance commands: compact, checkpoint and stats.

use super::{connect, connect_existing};
use kvlink_core::{CheckpointConfig, CompactConfig, ConnectionConfig, StatisticsLevel};
use serde::Serialize;
use std::path::Path;

/// One statistic in JSON output.
#[derive(Debug, Serialize)]
pub struct StatEntry {
    /// Statistic name.
    pub name: String,
    /// Current value.
    pub value: u64,
}

/// Runs the compact command.
pub fn compact(home: &Path, uri: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conn = connect_existing(home)?;
    let session = conn.open_session()?;
    session.compact(uri, &CompactConfig::default())?;
    println!("✓ Compacted {uri}");
    Ok(())
}

/// Runs the checkpoint command.
pub fn checkpoint(home: &Path, name: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let conn = connect_existing(home)?;
    let mut config = CheckpointConfig::new();
    if let Some(name) = name {
        config = config.name(name);
    }
    conn.checkpoint_with(&config)?;
    println!("✓ Checkpoint complete");
    Ok(())
}

/// Runs the stats command.
pub fn stats(home: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConnectionConfig::new()
        .create(false)
        .statistics(StatisticsLevel::All);
    let conn = connect(home, config)?;
    let stats: Vec<StatEntry> = conn
        .statistics()?
        .into_iter()
        .map(|(name, value)| StatEntry { name, value })
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        _ => {
            println!("kvlink Statistics");
            println!("=================");
            println!();
            println!("Home: {}", home.display());
            println!();
            let width = stats.iter().map(|s| s.name.len()).max().unwrap_or(0);
            for stat in &stats {
                println!("  {:width$}  {}", stat.name, stat.value);
            }
        }
    }
    Ok(())
}
