//! Typed configuration for every handle operation.
//!
//! Each type lists the options its operation recognizes. `Display` renders
//! the engine's configuration grammar and `FromStr` parses it, rejecting
//! unknown keys before the engine ever sees the string:
//!
//! ```rust
//! use kvlink_core::config::{CursorConfig, TableConfig};
//!
//! let table = TableConfig::new().columns(["id", "data"]);
//! assert_eq!(table.to_string(), "key_format=S,value_format=S,columns=(id,data)");
//!
//! let cursor: CursorConfig = "raw=true".parse().unwrap();
//! assert!(cursor.raw);
//! assert!("bogus=1".parse::<CursorConfig>().is_err());
//! ```

use crate::error::{CoreError, CoreResult};
use crate::extensions::ExtensionDiscovery;
use kvlink_engine::config::{ConfigMap, ConfigWriter};
use kvlink_engine::{EngineResult, Isolation, StatisticsLevel};
use std::fmt;
use std::str::FromStr;

fn parse_map(context: &'static str, input: &str, keys: &[&str]) -> CoreResult<ConfigMap> {
    let map = ConfigMap::parse(input).map_err(|err| CoreError::invalid_config(context, err.to_string()))?;
    map.ensure_only(keys, context)
        .map_err(|err| CoreError::invalid_config(context, err.to_string()))?;
    Ok(map)
}

fn read<T>(context: &'static str, result: EngineResult<T>) -> CoreResult<T> {
    result.map_err(|err| CoreError::invalid_config(context, err.to_string()))
}

fn write_config(f: &mut fmt::Formatter<'_>, writer: ConfigWriter) -> fmt::Result {
    f.write_str(&writer.finish())
}

fn true_flag(writer: ConfigWriter, key: &str, value: bool) -> ConfigWriter {
    if value {
        writer.bool(key, true)
    } else {
        writer
    }
}

/// Configuration for [`Connection::open`](crate::Connection::open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Create the database if it does not exist.
    pub create: bool,
    /// Cache size in bytes.
    pub cache_size: Option<u64>,
    /// Keep the database in memory only.
    pub in_memory: bool,
    /// Statistics exposed by the connection.
    pub statistics: StatisticsLevel,
    /// Maximum number of concurrently open sessions.
    pub session_max: Option<u64>,
    /// Fail if the database already exists.
    pub exclusive: bool,
    /// Compression extension discovery run after opening. Not part of the
    /// engine configuration string.
    pub extensions: ExtensionDiscovery,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            create: true,
            cache_size: None,
            in_memory: false,
            statistics: StatisticsLevel::None,
            session_max: None,
            exclusive: false,
            extensions: ExtensionDiscovery::default(),
        }
    }
}

impl ConnectionConfig {
    /// Keys the engine accepts when opening a connection.
    pub const KEYS: &'static [&'static str] = &[
        "create",
        "cache_size",
        "in_memory",
        "statistics",
        "session_max",
        "exclusive",
    ];

    /// Creates a configuration that creates missing databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a missing database is created.
    #[must_use]
    pub fn create(mut self, value: bool) -> Self {
        self.create = value;
        self
    }

    /// Sets the cache size in bytes.
    #[must_use]
    pub fn cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = Some(bytes);
        self
    }

    /// Sets whether the database lives in memory only.
    #[must_use]
    pub fn in_memory(mut self, value: bool) -> Self {
        self.in_memory = value;
        self
    }

    /// Sets the statistics level.
    #[must_use]
    pub fn statistics(mut self, level: StatisticsLevel) -> Self {
        self.statistics = level;
        self
    }

    /// Bounds the number of open sessions.
    #[must_use]
    pub fn session_max(mut self, max: u64) -> Self {
        self.session_max = Some(max);
        self
    }

    /// Sets whether an existing database is an error.
    #[must_use]
    pub fn exclusive(mut self, value: bool) -> Self {
        self.exclusive = value;
        self
    }

    /// Sets extension discovery.
    #[must_use]
    pub fn extensions(mut self, discovery: ExtensionDiscovery) -> Self {
        self.extensions = discovery;
        self
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = ConfigWriter::new();
        if self.create {
            writer = writer.flag("create");
        }
        writer = writer.opt_value("cache_size", self.cache_size);
        writer = true_flag(writer, "in_memory", self.in_memory);
        writer = match self.statistics {
            StatisticsLevel::None => writer,
            StatisticsLevel::Fast => writer.list("statistics", ["fast"]),
            StatisticsLevel::All => writer.list("statistics", ["all"]),
        };
        writer = writer.opt_value("session_max", self.session_max);
        writer = true_flag(writer, "exclusive", self.exclusive);
        write_config(f, writer)
    }
}

/// Parses the engine grammar. Unset options take the engine defaults, so a
/// string without `create` only opens existing databases. Discovery keeps
/// its default.
impl FromStr for ConnectionConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "connection";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        let statistics = match read(CONTEXT, map.get_list("statistics"))? {
            None => StatisticsLevel::None,
            Some(items) => StatisticsLevel::from_list(&items).ok_or_else(|| {
                CoreError::invalid_config(CONTEXT, format!("unknown statistics setting ({})", items.join(",")))
            })?,
        };
        Ok(Self {
            create: read(CONTEXT, map.get_bool("create"))?.unwrap_or(false),
            cache_size: read(CONTEXT, map.get_size("cache_size"))?,
            in_memory: read(CONTEXT, map.get_bool("in_memory"))?.unwrap_or(false),
            statistics,
            session_max: read(CONTEXT, map.get_int("session_max"))?,
            exclusive: read(CONTEXT, map.get_bool("exclusive"))?.unwrap_or(false),
            extensions: ExtensionDiscovery::default(),
        })
    }
}

/// Configuration for [`Session::create_table`](crate::Session::create_table).
///
/// Formats are passed to the engine verbatim: `S` for UTF-8 strings, `u`
/// for raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Key format.
    pub key_format: String,
    /// Value format.
    pub value_format: String,
    /// Column names, key column first. Required for indexes.
    pub columns: Vec<String>,
    /// Block compressor; its extension must be loaded.
    pub block_compressor: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            key_format: "S".into(),
            value_format: "S".into(),
            columns: Vec::new(),
            block_compressor: None,
        }
    }
}

impl TableConfig {
    /// Keys accepted by table creation.
    pub const KEYS: &'static [&'static str] =
        &["key_format", "value_format", "columns", "block_compressor"];

    /// Creates a string-keyed, string-valued table configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with raw byte keys and values.
    #[must_use]
    pub fn raw() -> Self {
        Self::new().key_format("u").value_format("u")
    }

    /// Sets the key format.
    #[must_use]
    pub fn key_format(mut self, format: impl Into<String>) -> Self {
        self.key_format = format.into();
        self
    }

    /// Sets the value format.
    #[must_use]
    pub fn value_format(mut self, format: impl Into<String>) -> Self {
        self.value_format = format.into();
        self
    }

    /// Names the key and value columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the block compressor.
    #[must_use]
    pub fn block_compressor(mut self, name: impl Into<String>) -> Self {
        self.block_compressor = Some(name.into());
        self
    }
}

impl fmt::Display for TableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = ConfigWriter::new()
            .value("key_format", &self.key_format)
            .value("value_format", &self.value_format);
        if !self.columns.is_empty() {
            writer = writer.list("columns", &self.columns);
        }
        writer = writer.opt_value("block_compressor", self.block_compressor.as_ref());
        write_config(f, writer)
    }
}

impl FromStr for TableConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "table";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        let defaults = Self::default();
        Ok(Self {
            key_format: read(CONTEXT, map.get_str("key_format"))?
                .map_or(defaults.key_format, str::to_string),
            value_format: read(CONTEXT, map.get_str("value_format"))?
                .map_or(defaults.value_format, str::to_string),
            columns: read(CONTEXT, map.get_list("columns"))?.unwrap_or_default(),
            block_compressor: read(CONTEXT, map.get_str("block_compressor"))?.map(str::to_string),
        })
    }
}

/// Configuration for [`Session::open_cursor_with_config`](crate::Session::open_cursor_with_config).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorConfig {
    /// Exchange items in the engine's packed form.
    pub raw: bool,
    /// Insert replaces existing keys and update creates missing ones.
    pub overwrite: bool,
    /// Reject writes through this cursor.
    pub readonly: bool,
}

impl CursorConfig {
    /// Keys accepted when opening a cursor.
    pub const KEYS: &'static [&'static str] = &["raw", "overwrite", "readonly"];

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets raw mode.
    #[must_use]
    pub fn raw(mut self, value: bool) -> Self {
        self.raw = value;
        self
    }

    /// Sets overwrite mode.
    #[must_use]
    pub fn overwrite(mut self, value: bool) -> Self {
        self.overwrite = value;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub fn readonly(mut self, value: bool) -> Self {
        self.readonly = value;
        self
    }
}

impl fmt::Display for CursorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = true_flag(ConfigWriter::new(), "raw", self.raw);
        writer = true_flag(writer, "overwrite", self.overwrite);
        writer = true_flag(writer, "readonly", self.readonly);
        write_config(f, writer)
    }
}

impl FromStr for CursorConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "cursor";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            raw: read(CONTEXT, map.get_bool("raw"))?.unwrap_or(false),
            overwrite: read(CONTEXT, map.get_bool("overwrite"))?.unwrap_or(false),
            readonly: read(CONTEXT, map.get_bool("readonly"))?.unwrap_or(false),
        })
    }
}

/// Configuration for [`Session::begin_transaction_with`](crate::Session::begin_transaction_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Isolation level; the session default when unset.
    pub isolation: Option<Isolation>,
    /// Name reported in logs.
    pub name: Option<String>,
    /// Priority in `-100..=100`.
    pub priority: Option<i32>,
    /// Sync the commit to stable storage.
    pub sync: Option<bool>,
    /// Engine-side operation timeout.
    pub operation_timeout_ms: Option<u64>,
}

impl TransactionConfig {
    /// Keys accepted by `begin_transaction`.
    pub const KEYS: &'static [&'static str] =
        &["isolation", "name", "priority", "sync", "operation_timeout_ms"];

    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the isolation level.
    #[must_use]
    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    /// Names the transaction.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets commit sync behavior.
    #[must_use]
    pub fn sync(mut self, value: bool) -> Self {
        self.sync = Some(value);
        self
    }

    /// Sets the operation timeout.
    #[must_use]
    pub fn operation_timeout_ms(mut self, ms: u64) -> Self {
        self.operation_timeout_ms = Some(ms);
        self
    }
}

impl fmt::Display for TransactionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let writer = ConfigWriter::new()
            .opt_value("isolation", self.isolation.map(Isolation::as_str))
            .opt_value("name", self.name.as_ref())
            .opt_value("priority", self.priority)
            .opt_value("sync", self.sync)
            .opt_value("operation_timeout_ms", self.operation_timeout_ms);
        write_config(f, writer)
    }
}

impl FromStr for TransactionConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "transaction";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        let isolation = match read(CONTEXT, map.get_str("isolation"))? {
            Some(name) => Some(read(CONTEXT, Isolation::parse(name))?),
            None => None,
        };
        let priority = match read(CONTEXT, map.get_signed("priority"))? {
            Some(p) => Some(i32::try_from(p).map_err(|_| {
                CoreError::invalid_config(CONTEXT, format!("priority {p} is out of range"))
            })?),
            None => None,
        };
        Ok(Self {
            isolation,
            name: read(CONTEXT, map.get_str("name"))?.map(str::to_string),
            priority,
            sync: read(CONTEXT, map.get_bool("sync"))?,
            operation_timeout_ms: read(CONTEXT, map.get_int("operation_timeout_ms"))?,
        })
    }
}

/// Configuration for [`Session::commit_transaction_with`](crate::Session::commit_transaction_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitConfig {
    /// Sync the commit to stable storage.
    pub sync: Option<bool>,
    /// Engine-side operation timeout.
    pub operation_timeout_ms: Option<u64>,
}

impl CommitConfig {
    /// Keys accepted by `commit_transaction`.
    pub const KEYS: &'static [&'static str] = &["sync", "operation_timeout_ms"];

    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets commit sync behavior.
    #[must_use]
    pub fn sync(mut self, value: bool) -> Self {
        self.sync = Some(value);
        self
    }

    /// Sets the operation timeout.
    #[must_use]
    pub fn operation_timeout_ms(mut self, ms: u64) -> Self {
        self.operation_timeout_ms = Some(ms);
        self
    }
}

impl fmt::Display for CommitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let writer = ConfigWriter::new()
            .opt_value("sync", self.sync)
            .opt_value("operation_timeout_ms", self.operation_timeout_ms);
        write_config(f, writer)
    }
}

impl FromStr for CommitConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "commit";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            sync: read(CONTEXT, map.get_bool("sync"))?,
            operation_timeout_ms: read(CONTEXT, map.get_int("operation_timeout_ms"))?,
        })
    }
}

/// Configuration for [`Session::rollback_transaction_with`](crate::Session::rollback_transaction_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackConfig {
    /// Engine-side operation timeout.
    pub operation_timeout_ms: Option<u64>,
}

impl RollbackConfig {
    /// Keys accepted by `rollback_transaction`.
    pub const KEYS: &'static [&'static str] = &["operation_timeout_ms"];

    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operation timeout.
    #[must_use]
    pub fn operation_timeout_ms(mut self, ms: u64) -> Self {
        self.operation_timeout_ms = Some(ms);
        self
    }
}

impl fmt::Display for RollbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_config(
            f,
            ConfigWriter::new().opt_value("operation_timeout_ms", self.operation_timeout_ms),
        )
    }
}

impl FromStr for RollbackConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "rollback";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            operation_timeout_ms: read(CONTEXT, map.get_int("operation_timeout_ms"))?,
        })
    }
}

/// Configuration for [`Session::create_index`](crate::Session::create_index).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexConfig {
    /// Indexed columns of the table.
    pub columns: Vec<String>,
}

impl IndexConfig {
    /// Keys accepted by index creation.
    pub const KEYS: &'static [&'static str] = &["columns"];

    /// Indexes the given columns.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return Ok(());
        }
        write_config(f, ConfigWriter::new().list("columns", &self.columns))
    }
}

impl FromStr for IndexConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "index";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            columns: read(CONTEXT, map.get_list("columns"))?.unwrap_or_default(),
        })
    }
}

/// Configuration for [`Session::drop_object`](crate::Session::drop_object).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropConfig {
    /// Drop even if the object is in use or missing.
    pub force: bool,
}

impl DropConfig {
    /// Keys accepted by drop.
    pub const KEYS: &'static [&'static str] = &["force"];

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets forced dropping.
    #[must_use]
    pub fn force(mut self, value: bool) -> Self {
        self.force = value;
        self
    }
}

impl fmt::Display for DropConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_config(f, true_flag(ConfigWriter::new(), "force", self.force))
    }
}

impl FromStr for DropConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "drop";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            force: read(CONTEXT, map.get_bool("force"))?.unwrap_or(false),
        })
    }
}

/// Configuration for [`Session::compact`](crate::Session::compact).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactConfig {
    /// Engine-side timeout in seconds.
    pub timeout: Option<u64>,
}

impl CompactConfig {
    /// Keys accepted by compact.
    pub const KEYS: &'static [&'static str] = &["timeout"];

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout in seconds.
    #[must_use]
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

impl fmt::Display for CompactConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_config(f, ConfigWriter::new().opt_value("timeout", self.timeout))
    }
}

impl FromStr for CompactConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "compact";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            timeout: read(CONTEXT, map.get_int("timeout"))?,
        })
    }
}

/// Configuration for [`Connection::checkpoint_with`](crate::Connection::checkpoint_with).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Checkpoint even if nothing changed.
    pub force: bool,
    /// Name recorded with the checkpoint.
    pub name: Option<String>,
}

impl CheckpointConfig {
    /// Keys accepted by checkpoint.
    pub const KEYS: &'static [&'static str] = &["force", "name"];

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets forced checkpointing.
    #[must_use]
    pub fn force(mut self, value: bool) -> Self {
        self.force = value;
        self
    }

    /// Names the checkpoint.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for CheckpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let writer = true_flag(ConfigWriter::new(), "force", self.force)
            .opt_value("name", self.name.as_ref());
        write_config(f, writer)
    }
}

impl FromStr for CheckpointConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "checkpoint";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            force: read(CONTEXT, map.get_bool("force"))?.unwrap_or(false),
            name: read(CONTEXT, map.get_str("name"))?.map(str::to_string),
        })
    }
}

/// Configuration for [`Connection::load_extension`](crate::Connection::load_extension).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionConfig {
    /// Entry point symbol.
    pub entry: Option<String>,
    /// Configuration handed to the entry point.
    pub config: Option<String>,
    /// Termination symbol.
    pub terminate: Option<String>,
    /// Load before the database opens.
    pub early_load: bool,
}

impl ExtensionConfig {
    /// Keys accepted by extension loading.
    pub const KEYS: &'static [&'static str] = &["entry", "config", "terminate", "early_load"];

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entry point.
    #[must_use]
    pub fn entry(mut self, symbol: impl Into<String>) -> Self {
        self.entry = Some(symbol.into());
        self
    }

    /// Sets the entry point configuration.
    #[must_use]
    pub fn config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Sets the termination symbol.
    #[must_use]
    pub fn terminate(mut self, symbol: impl Into<String>) -> Self {
        self.terminate = Some(symbol.into());
        self
    }

    /// Sets early loading.
    #[must_use]
    pub fn early_load(mut self, value: bool) -> Self {
        self.early_load = value;
        self
    }
}

impl fmt::Display for ExtensionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let writer = ConfigWriter::new()
            .opt_value("entry", self.entry.as_ref())
            .opt_value("config", self.config.as_ref())
            .opt_value("terminate", self.terminate.as_ref());
        write_config(f, true_flag(writer, "early_load", self.early_load))
    }
}

impl FromStr for ExtensionConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        const CONTEXT: &str = "extension";
        let map = parse_map(CONTEXT, s, Self::KEYS)?;
        Ok(Self {
            entry: read(CONTEXT, map.get_str("entry"))?.map(str::to_string),
            config: read(CONTEXT, map.get_str("config"))?.map(str::to_string),
            terminate: read(CONTEXT, map.get_str("terminate"))?.map(str::to_string),
            early_load: read(CONTEXT, map.get_bool("early_load"))?.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_defaults_create() {
        assert_eq!(ConnectionConfig::default().to_string(), "create");
        let config = ConnectionConfig::new()
            .cache_size(500 * 1024 * 1024)
            .statistics(StatisticsLevel::Fast)
            .session_max(8);
        assert_eq!(
            config.to_string(),
            "create,cache_size=524288000,statistics=(fast),session_max=8"
        );
    }

    #[test]
    fn connection_parse() {
        let config: ConnectionConfig = "create,cache_size=100M,statistics=(all),in_memory"
            .parse()
            .unwrap();
        assert!(config.create);
        assert!(config.in_memory);
        assert_eq!(config.cache_size, Some(100 * 1024 * 1024));
        assert_eq!(config.statistics, StatisticsLevel::All);

        let existing: ConnectionConfig = "".parse().unwrap();
        assert!(!existing.create);

        let err = "create,log=(enabled)".parse::<ConnectionConfig>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { context: "connection", .. }));
        assert!("statistics=(verbose)".parse::<ConnectionConfig>().is_err());
        assert!("cache_size=lots".parse::<ConnectionConfig>().is_err());
    }

    #[test]
    fn table_config_rendering() {
        assert_eq!(TableConfig::new().to_string(), "key_format=S,value_format=S");
        assert_eq!(TableConfig::raw().to_string(), "key_format=u,value_format=u");
        let config = TableConfig::new()
            .columns(["id", "data"])
            .block_compressor("zstd");
        assert_eq!(
            config.to_string(),
            "key_format=S,value_format=S,columns=(id,data),block_compressor=zstd"
        );
    }

    #[test]
    fn table_config_parse_fills_defaults() {
        let config: TableConfig = "columns=(k,v)".parse().unwrap();
        assert_eq!(config.key_format, "S");
        assert_eq!(config.columns, vec!["k", "v"]);
        assert!("key_format=S,prefix_compression=true".parse::<TableConfig>().is_err());
    }

    #[test]
    fn cursor_config_flags() {
        assert_eq!(CursorConfig::new().to_string(), "");
        assert_eq!(
            CursorConfig::new().raw(true).overwrite(true).to_string(),
            "raw=true,overwrite=true"
        );
        let parsed: CursorConfig = "overwrite=false,readonly".parse().unwrap();
        assert!(!parsed.overwrite);
        assert!(parsed.readonly);
    }

    #[test]
    fn transaction_config() {
        let config = TransactionConfig::new()
            .isolation(Isolation::ReadCommitted)
            .name("batch load")
            .priority(-5);
        let rendered = config.to_string();
        assert_eq!(rendered, "isolation=read-committed,name=\"batch load\",priority=-5");
        assert_eq!(rendered.parse::<TransactionConfig>().unwrap(), config);

        assert!("isolation=serializable".parse::<TransactionConfig>().is_err());
        assert!("timeout=5".parse::<TransactionConfig>().is_err());
    }

    #[test]
    fn empty_names_round_trip() {
        let config = TransactionConfig::new().name("");
        assert_eq!(config.to_string(), "name=\"\"");
        assert_eq!(config.to_string().parse::<TransactionConfig>().unwrap(), config);

        let checkpoint = CheckpointConfig::new().name("");
        let parsed: CheckpointConfig = checkpoint.to_string().parse().unwrap();
        assert_eq!(parsed.name.as_deref(), Some(""));
    }

    #[test]
    fn commit_and_rollback_configs() {
        assert_eq!(CommitConfig::new().sync(true).to_string(), "sync=true");
        let rollback: RollbackConfig = "operation_timeout_ms=250".parse().unwrap();
        assert_eq!(rollback.operation_timeout_ms, Some(250));
        assert!("sync=true".parse::<RollbackConfig>().is_err());
    }

    #[test]
    fn maintenance_configs() {
        assert_eq!(IndexConfig::new(["data"]).to_string(), "columns=(data)");
        assert_eq!(DropConfig::new().force(true).to_string(), "force=true");
        assert_eq!(CompactConfig::new().timeout(30).to_string(), "timeout=30");
        assert_eq!(
            CheckpointConfig::new().name("nightly").to_string(),
            "name=nightly"
        );
        assert!(DropConfig::from_str("").is_ok_and(|c| !c.force));
    }

    #[test]
    fn extension_config() {
        let config = ExtensionConfig::new().entry("kvlink_extension_init").early_load(true);
        assert_eq!(config.to_string(), "entry=kvlink_extension_init,early_load=true");
        assert!("path=/x".parse::<ExtensionConfig>().is_err());
    }
}
