//! Connections: database lifecycle and session tracking.
//!
//! A [`Connection`] moves through three states: empty, open and closed.
//! Closed is terminal. While open it tracks every session it handed out,
//! keyed by [`SessionId`], so that closing the connection releases each
//! outstanding session exactly once before the connection handle itself.

use crate::config::{CheckpointConfig, ConnectionConfig, ExtensionConfig};
use crate::error::{CoreError, CoreResult};
use crate::extensions::{self, ExtensionReport};
use crate::session::{release, Session, SessionSlot};
use crate::types::SessionId;
use kvlink_engine::{Engine, KvEngine, RawConnection};
use parking_lot::{Mutex, RwLock};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

enum ConnectionState {
    Empty,
    Open(OpenConnection),
    Closed,
}

struct OpenConnection {
    raw: Box<dyn RawConnection>,
    home: PathBuf,
    extensions: ExtensionReport,
}

impl ConnectionState {
    fn open(&self) -> CoreResult<&OpenConnection> {
        match self {
            Self::Open(open) => Ok(open),
            Self::Empty => Err(CoreError::NotOpen),
            Self::Closed => Err(CoreError::ConnectionClosed),
        }
    }
}

/// State shared between a connection and the sessions it opened.
pub(crate) struct ConnectionShared {
    engine: Arc<dyn Engine>,
    state: RwLock<ConnectionState>,
    sessions: Mutex<BTreeMap<SessionId, Arc<SessionSlot>>>,
}

impl ConnectionShared {
    /// Forgets a session that closed itself.
    pub(crate) fn deregister(&self, id: SessionId) -> bool {
        let removed = self.sessions.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(session = %id, "session deregistered");
        }
        removed
    }
}

/// A connection to a database.
///
/// # Example
///
/// ```rust
/// use kvlink_core::config::{ConnectionConfig, TableConfig};
/// use kvlink_core::extensions::ExtensionDiscovery;
/// use kvlink_core::Connection;
///
/// let dir = tempfile::tempdir().unwrap();
/// let conn = Connection::new();
/// let config = ConnectionConfig::new().extensions(ExtensionDiscovery::disabled());
/// conn.open(dir.path(), &config).unwrap();
///
/// let _first = conn.open_session().unwrap();
/// let _second = conn.open_session().unwrap();
/// assert_eq!(conn.session_count(), 2);
///
/// conn.close().unwrap();
/// assert_eq!(conn.session_count(), 0);
/// conn.close().unwrap();
/// ```
pub struct Connection {
    shared: Arc<ConnectionShared>,
}

impl Connection {
    /// Creates an empty connection over the bundled engine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_engine(Arc::new(KvEngine::new()))
    }

    /// Creates an empty connection over `engine`.
    #[must_use]
    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self {
            shared: Arc::new(ConnectionShared {
                engine,
                state: RwLock::new(ConnectionState::Empty),
                sessions: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Opens or creates the database at `path`, then runs compression
    /// extension discovery.
    ///
    /// Discovery never fails the open; see [`Connection::extension_report`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyOpen`] or [`CoreError::ConnectionClosed`]
    /// outside the empty state, and engine errors for an unusable path or a
    /// rejected configuration.
    pub fn open(&self, path: impl AsRef<Path>, config: &ConnectionConfig) -> CoreResult<()> {
        let mut state = self.shared.state.write();
        match *state {
            ConnectionState::Empty => {}
            ConnectionState::Open(_) => return Err(CoreError::AlreadyOpen),
            ConnectionState::Closed => return Err(CoreError::ConnectionClosed),
        }

        let home = path.as_ref().to_path_buf();
        let raw = self.shared.engine.open(&home, &config.to_string())?;
        let extensions = extensions::discover(
            &config.extensions,
            self.shared.engine.install_dir(),
            |module| raw.load_extension(module, ""),
        );
        tracing::info!(
            home = %home.display(),
            engine = self.shared.engine.name(),
            compressors = extensions.loaded().count(),
            "connection opened"
        );

        *state = ConnectionState::Open(OpenConnection {
            raw,
            home,
            extensions,
        });
        Ok(())
    }

    /// Opens a session and starts tracking it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingSessionId`] if the engine hands back a
    /// session without a valid identifier, [`CoreError::DuplicateSessionId`]
    /// if the identifier is already tracked (the new handle is closed first
    /// in both cases), and engine errors such as too many open sessions.
    pub fn open_session(&self) -> CoreResult<Session> {
        let state = self.shared.state.read();
        let open = state.open()?;
        let mut raw = open.raw.open_session("")?;

        let Some(id) = raw.native_id().as_deref().and_then(SessionId::from_native) else {
            if let Err(err) = raw.close("") {
                tracing::warn!(error = %err, "failed to close session without identifier");
            }
            return Err(CoreError::MissingSessionId);
        };

        let mut sessions = self.shared.sessions.lock();
        let slot = match sessions.entry(id) {
            Entry::Occupied(_) => {
                drop(sessions);
                if let Err(err) = raw.close("") {
                    tracing::warn!(session = %id, error = %err, "failed to close duplicate session");
                }
                return Err(CoreError::DuplicateSessionId(id));
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(SessionSlot::new(raw)))),
        };
        drop(sessions);
        tracing::debug!(session = %id, "session opened");
        Ok(Session::new(id, slot, Arc::downgrade(&self.shared)))
    }

    /// Forces a checkpoint.
    ///
    /// # Errors
    ///
    /// Fails if the connection is not open or the engine cannot write.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.checkpoint_with(&CheckpointConfig::default())
    }

    /// Forces a checkpoint with options.
    ///
    /// # Errors
    ///
    /// Fails if the connection is not open or the engine cannot write.
    pub fn checkpoint_with(&self, config: &CheckpointConfig) -> CoreResult<()> {
        let state = self.shared.state.read();
        let open = state.open()?;
        open.raw.checkpoint(&config.to_string())?;
        tracing::info!(home = %open.home.display(), name = ?config.name, "checkpoint complete");
        Ok(())
    }

    /// Loads an extension module.
    ///
    /// Unlike discovery at open, failures are returned.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ExtensionLoad`] if the engine does not accept
    /// the module.
    pub fn load_extension(&self, path: impl AsRef<Path>, config: &ExtensionConfig) -> CoreResult<()> {
        let path = path.as_ref();
        let state = self.shared.state.read();
        let open = state.open()?;
        open.raw
            .load_extension(path, &config.to_string())
            .map_err(|err| CoreError::extension_load(path, err))?;
        tracing::info!(path = %path.display(), "extension loaded");
        Ok(())
    }

    /// Engine statistics as `(name, value)` pairs.
    ///
    /// # Errors
    ///
    /// Fails unless the connection was opened with statistics enabled.
    pub fn statistics(&self) -> CoreResult<Vec<(String, u64)>> {
        let state = self.shared.state.read();
        Ok(state.open()?.raw.statistics()?)
    }

    /// Closes every tracked session, then the connection.
    ///
    /// Sessions are released in identifier order. A session that fails to
    /// close is logged and skipped. Closing an empty or closed connection
    /// is a no-op; either way the connection ends up closed.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if closing the connection handle fails.
    pub fn close(&self) -> CoreResult<()> {
        let previous = std::mem::replace(&mut *self.shared.state.write(), ConnectionState::Closed);
        let ConnectionState::Open(OpenConnection { mut raw, home, .. }) = previous else {
            return Ok(());
        };

        let sessions = std::mem::take(&mut *self.shared.sessions.lock());
        let tracked = sessions.len();
        for (id, slot) in sessions {
            let Some(session) = slot.take() else {
                continue;
            };
            if let Err(err) = release(id, session) {
                tracing::warn!(session = %id, error = %err, "failed to release session");
            }
        }

        raw.close("")?;
        tracing::info!(home = %home.display(), sessions = tracked, "connection closed");
        Ok(())
    }

    /// Returns true between a successful open and close.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.shared.state.read(), ConnectionState::Open(_))
    }

    /// Number of sessions currently tracked.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.sessions.lock().len()
    }

    /// Identifiers of the tracked sessions, in order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.shared.sessions.lock().keys().copied().collect()
    }

    /// The database path, while open.
    #[must_use]
    pub fn home(&self) -> Option<PathBuf> {
        self.shared.state.read().open().ok().map(|open| open.home.clone())
    }

    /// What extension discovery found at open, while open.
    #[must_use]
    pub fn extension_report(&self) -> Option<ExtensionReport> {
        self.shared
            .state
            .read()
            .open()
            .ok()
            .map(|open| open.extensions.clone())
    }

    /// The engine behind this connection.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.shared.engine
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.shared.engine.name())
            .field("home", &self.home())
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "error closing connection on drop");
        }
    }
}
