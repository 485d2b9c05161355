//! The bundled embedded engine.
//!
//! `KvEngine` keeps every table in memory as multi-version rows and makes
//! committed state durable through checkpoints (see [`crate::store`]). There
//! is no write-ahead log: work committed after the last checkpoint is lost if
//! the process dies before the next one. Closing a connection always writes a
//! final checkpoint.
//!
//! Lock order, outermost first: session state, catalog. Checkpoints take the
//! store lock before reading the catalog so images are appended in commit
//! order. The connection's session registry is never held while a session's
//! state is locked.

mod cursor;
mod session;

use crate::api::{Engine, RawConnection, RawSession};
use crate::catalog::Catalog;
use crate::config::ConfigMap;
use crate::error::{EngineError, EngineResult};
use crate::extension::ExtensionRegistry;
use crate::home::{Home, HomeOptions};
use crate::image::{CheckpointImage, IndexImage, TableImage};
use crate::mvcc::{Isolation, ReadView};
use crate::schema::{IndexSchema, TableSchema};
use crate::stats::{EngineStats, Stat, StatisticsLevel};
use crate::store::{CheckpointStore, FileStore, MemoryStore};
use crate::txn::TxnManager;
use parking_lot::{Mutex, RwLock};
use session::{KvSession, SessionCore};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Keys accepted when opening a connection.
pub const CONNECTION_CONFIG_KEYS: &[&str] = &[
    "create",
    "cache_size",
    "in_memory",
    "statistics",
    "session_max",
    "exclusive",
];

/// Default bound on concurrently open sessions.
pub const DEFAULT_SESSION_MAX: u64 = 100;

/// Default cache size when none is configured.
pub const DEFAULT_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Environment variable overriding the engine install directory.
pub const INSTALL_DIR_ENV: &str = "KVLINK_INSTALL_DIR";

const CHECKPOINT_CONFIG_KEYS: &[&str] = &["force", "name"];

/// The bundled engine.
///
/// # Example
///
/// ```rust
/// use kvlink_engine::{Engine, KvEngine};
///
/// let dir = tempfile::tempdir().unwrap();
/// let engine = KvEngine::new();
/// let mut conn = engine.open(dir.path(), "create").unwrap();
/// let session = conn.open_session("").unwrap();
/// session.create("table:t", "key_format=S,value_format=S").unwrap();
/// drop(session);
/// conn.close("").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct KvEngine {
    install_dir: Option<PathBuf>,
}

impl Default for KvEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEngine {
    /// Creates an engine installed where [`INSTALL_DIR_ENV`] points, or
    /// else next to the running executable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            install_dir: resolve_install_dir(
                std::env::var_os(INSTALL_DIR_ENV),
                std::env::current_exe().ok(),
            ),
        }
    }

    /// Creates an engine installed at `dir`.
    ///
    /// Bundled extensions are looked up below `dir/ext/compressors`.
    #[must_use]
    pub fn with_install_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: Some(dir.into()),
        }
    }
}

fn resolve_install_dir(env: Option<OsString>, exe: Option<PathBuf>) -> Option<PathBuf> {
    match env {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => exe.and_then(|exe| exe.parent().map(Path::to_path_buf)),
    }
}

impl Engine for KvEngine {
    fn name(&self) -> &str {
        "kvlink"
    }

    fn install_dir(&self) -> Option<&Path> {
        self.install_dir.as_deref()
    }

    fn open(&self, home: &Path, config: &str) -> EngineResult<Box<dyn RawConnection>> {
        Ok(Box::new(KvConnection::open(home, config)?))
    }
}

/// Options resolved from a connection configuration string.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    home: HomeOptions,
    in_memory: bool,
    cache_size: u64,
    statistics: StatisticsLevel,
    session_max: u64,
}

impl ConnectionOptions {
    fn parse(config: &str) -> EngineResult<Self> {
        let map = ConfigMap::parse(config)?;
        map.ensure_only(CONNECTION_CONFIG_KEYS, "connection")?;

        let statistics = match map.get_list("statistics")? {
            None => StatisticsLevel::None,
            Some(items) => StatisticsLevel::from_list(&items).ok_or_else(|| {
                EngineError::invalid_config(format!(
                    "unknown statistics setting ({}), expected none, fast, all or clear",
                    items.join(",")
                ))
            })?,
        };
        let session_max = map.get_int("session_max")?.unwrap_or(DEFAULT_SESSION_MAX);
        if session_max == 0 {
            return Err(EngineError::invalid_config("session_max must be at least 1"));
        }

        Ok(Self {
            home: HomeOptions {
                create: map.get_bool("create")?.unwrap_or(false),
                exclusive: map.get_bool("exclusive")?.unwrap_or(false),
            },
            in_memory: map.get_bool("in_memory")?.unwrap_or(false),
            cache_size: map.get_size("cache_size")?.unwrap_or(DEFAULT_CACHE_SIZE),
            statistics,
            session_max,
        })
    }
}

/// State shared by a connection and every handle opened from it.
pub(crate) struct Shared {
    label: String,
    home: Mutex<Option<Home>>,
    store: Mutex<Box<dyn CheckpointStore>>,
    catalog: RwLock<Catalog>,
    txns: TxnManager,
    extensions: RwLock<ExtensionRegistry>,
    stats: EngineStats,
    statistics: StatisticsLevel,
    session_max: u64,
    sessions: Mutex<BTreeMap<u64, Arc<SessionCore>>>,
    next_session: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    /// Captures committed state and stores it durably.
    fn checkpoint(&self, name: Option<String>) -> EngineResult<()> {
        let mut store = self.store.lock();
        let image = {
            let catalog = self.catalog.read();
            let last_commit = self.txns.last_commit();
            let view = ReadView::at(last_commit);
            CheckpointImage {
                last_commit,
                name,
                tables: catalog
                    .tables()
                    .map(|table| TableImage {
                        name: table.schema().name.clone(),
                        config: table.schema().to_config(),
                        rows: table.visible_rows(&view),
                    })
                    .collect(),
                indexes: catalog
                    .indexes()
                    .map(|index| IndexImage {
                        table: index.table.clone(),
                        name: index.name.clone(),
                        config: index.to_config(),
                    })
                    .collect(),
            }
        };

        let bytes = image.encode()?;
        store.append(&bytes)?;
        self.stats.record(Stat::Checkpoint);
        tracing::debug!(
            home = %self.label,
            last_commit = image.last_commit,
            tables = image.tables.len(),
            bytes = bytes.len(),
            "checkpoint written"
        );
        Ok(())
    }

    /// Counter values, plus per-table gauges at `statistics=(all)`.
    fn statistics_snapshot(&self) -> EngineResult<Vec<(String, u64)>> {
        if self.statistics == StatisticsLevel::None {
            return Err(EngineError::invalid_argument(
                "statistics are not enabled on this connection",
            ));
        }
        let mut stats = self.stats.snapshot();
        if self.statistics == StatisticsLevel::All {
            let catalog = self.catalog.read();
            for table in catalog.tables() {
                stats.push((
                    format!("table: {} stored keys", table.schema().name),
                    table.stored_keys() as u64,
                ));
            }
        }
        Ok(stats)
    }

    /// Closes every session, writes a final checkpoint and releases the home.
    fn shutdown(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sessions: Vec<Arc<SessionCore>> = {
            let mut registry = self.sessions.lock();
            std::mem::take(&mut *registry).into_values().collect()
        };
        for core in &sessions {
            core.shutdown(self);
        }

        let result = self.checkpoint(None);
        let home = self.home.lock().take();
        tracing::info!(
            home = %self.label,
            sessions_closed = sessions.len(),
            "connection closed"
        );
        drop(home);
        result
    }
}

/// A connection to a [`KvEngine`] database.
pub struct KvConnection {
    shared: Arc<Shared>,
}

impl KvConnection {
    /// Opens or creates a database.
    ///
    /// # Errors
    ///
    /// Fails for invalid configuration, an unusable or locked home, or a
    /// corrupted checkpoint.
    pub fn open(home: &Path, config: &str) -> EngineResult<Self> {
        let options = ConnectionOptions::parse(config)?;

        let (home_dir, store): (Option<Home>, Box<dyn CheckpointStore>) = if options.in_memory {
            (None, Box::new(MemoryStore::new()) as Box<dyn CheckpointStore>)
        } else {
            let dir = Home::open(home, options.home)?;
            let store = FileStore::open(&dir.checkpoint_path(), &dir.checkpoint_temp_path())?;
            (Some(dir), Box::new(store) as Box<dyn CheckpointStore>)
        };

        let mut catalog = Catalog::new();
        let mut last_commit = 0;
        if let Some(bytes) = store.latest() {
            let image = CheckpointImage::decode(bytes)?;
            last_commit = image.last_commit;
            restore(&mut catalog, image)?;
        }

        let label = if options.in_memory {
            format!("{} (in memory)", home.display())
        } else {
            home.display().to_string()
        };
        tracing::info!(
            home = %label,
            created = home_dir.as_ref().is_some_and(Home::created),
            tables = catalog.tables().count(),
            cache_size = options.cache_size,
            "database opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                label,
                home: Mutex::new(home_dir),
                store: Mutex::new(store),
                catalog: RwLock::new(catalog),
                txns: TxnManager::new(last_commit),
                extensions: RwLock::new(ExtensionRegistry::new()),
                stats: EngineStats::new(),
                statistics: options.statistics,
                session_max: options.session_max,
                sessions: Mutex::new(BTreeMap::new()),
                next_session: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

fn restore(catalog: &mut Catalog, image: CheckpointImage) -> EngineResult<()> {
    for table in image.tables {
        let schema = TableSchema::from_config(&table.name, &ConfigMap::parse(&table.config)?)?;
        catalog.create_table(schema)?;
        let restored = catalog.table_mut(&table.name)?;
        for (key, value) in table.rows {
            restored.restore(key, value, image.last_commit);
        }
    }
    for index in image.indexes {
        let table = catalog.table(&index.table)?.schema().clone();
        let schema = IndexSchema::from_config(&table, &index.name, &ConfigMap::parse(&index.config)?)?;
        catalog.create_index(schema)?;
    }
    Ok(())
}

impl RawConnection for KvConnection {
    fn open_session(&self, config: &str) -> EngineResult<Box<dyn RawSession>> {
        self.shared.ensure_open()?;
        let map = ConfigMap::parse(config)?;
        map.ensure_only(&["isolation"], "session")?;
        let isolation = match map.get_str("isolation")? {
            Some(name) => Isolation::parse(name)?,
            None => Isolation::default(),
        };

        let core = {
            let mut registry = self.shared.sessions.lock();
            if registry.len() as u64 >= self.shared.session_max {
                return Err(EngineError::busy(format!(
                    "session_max ({}) sessions already open",
                    self.shared.session_max
                )));
            }
            let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
            let core = Arc::new(SessionCore::new(id, isolation));
            registry.insert(id, Arc::clone(&core));
            core
        };
        self.shared.stats.record(Stat::SessionOpen);
        tracing::debug!(session = core.id(), "engine session opened");

        Ok(Box::new(KvSession::new(Arc::clone(&self.shared), core)))
    }

    fn checkpoint(&self, config: &str) -> EngineResult<()> {
        self.shared.ensure_open()?;
        let map = ConfigMap::parse(config)?;
        map.ensure_only(CHECKPOINT_CONFIG_KEYS, "checkpoint")?;
        map.get_bool("force")?;
        let name = map.get_str("name")?.map(str::to_string);
        self.shared.checkpoint(name)
    }

    fn load_extension(&self, path: &Path, config: &str) -> EngineResult<()> {
        self.shared.ensure_open()?;
        let map =
            ConfigMap::parse(config).map_err(|err| EngineError::extension(path, err.to_string()))?;
        let compressor = self.shared.extensions.write().load(path, &map)?;
        tracing::info!(path = %path.display(), compressor = %compressor, "extension loaded");
        Ok(())
    }

    fn statistics(&self) -> EngineResult<Vec<(String, u64)>> {
        self.shared.ensure_open()?;
        self.shared.statistics_snapshot()
    }

    fn close(&mut self, config: &str) -> EngineResult<()> {
        ConfigMap::parse(config)?.ensure_only(&[], "connection close")?;
        self.shared.shutdown()
    }
}

impl Drop for KvConnection {
    fn drop(&mut self) {
        if let Err(err) = self.shared.shutdown() {
            tracing::warn!(home = %self.shared.label, error = %err, "error closing connection on drop");
        }
    }
}

#[cfg(test)]
mod tests;
