//! A storage-free engine for exercising handle lifecycles.
//!
//! [`StubEngine`] hands out sessions whose native identifier is chosen by
//! the test, and records every open and close, so tests can check that
//! each handle is released exactly once.

use kvlink_engine::{Engine, EngineError, EngineResult, RawConnection, RawCursor, RawSession};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// How the stub identifies the sessions it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeIds {
    /// `"1"`, `"2"`, ... in opening order.
    Sequential,
    /// No identifier at all.
    Missing,
    /// The same identifier for every session.
    Fixed(String),
}

/// Open/close counts recorded by a [`StubEngine`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StubLog {
    /// Connections opened.
    pub connections_opened: usize,
    /// Connection close calls.
    pub connections_closed: usize,
    /// Sessions opened.
    pub sessions_opened: usize,
    /// Close calls per session, keyed by opening order.
    pub session_closes: BTreeMap<usize, usize>,
}

impl StubLog {
    /// Sessions closed at least once.
    pub fn sessions_closed(&self) -> usize {
        self.session_closes.len()
    }

    /// Returns true if no session was closed more than once.
    pub fn closed_at_most_once(&self) -> bool {
        self.session_closes.values().all(|&count| count == 1)
    }
}

/// An engine without storage.
#[derive(Debug, Clone)]
pub struct StubEngine {
    ids: NativeIds,
    log: Arc<Mutex<StubLog>>,
}

impl StubEngine {
    /// Creates a stub whose sessions are identified as `ids` says.
    pub fn new(ids: NativeIds) -> Self {
        Self {
            ids,
            log: Arc::new(Mutex::new(StubLog::default())),
        }
    }

    /// A snapshot of what happened so far.
    pub fn log(&self) -> StubLog {
        self.log.lock().clone()
    }

    /// Opens a session directly, bypassing any connection.
    pub fn raw_session(&self) -> Box<dyn RawSession> {
        open_stub_session(&self.ids, &self.log)
    }
}

fn open_stub_session(ids: &NativeIds, log: &Arc<Mutex<StubLog>>) -> Box<dyn RawSession> {
    let ordinal = {
        let mut log = log.lock();
        log.sessions_opened += 1;
        log.sessions_opened
    };
    let native_id = match ids {
        NativeIds::Sequential => Some(ordinal.to_string()),
        NativeIds::Missing => None,
        NativeIds::Fixed(id) => Some(id.clone()),
    };
    Box::new(StubSession {
        ordinal,
        native_id,
        log: Arc::clone(log),
    })
}

impl Engine for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    fn install_dir(&self) -> Option<&Path> {
        None
    }

    fn open(&self, _home: &Path, _config: &str) -> EngineResult<Box<dyn RawConnection>> {
        self.log.lock().connections_opened += 1;
        Ok(Box::new(StubConnection {
            ids: self.ids.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct StubConnection {
    ids: NativeIds,
    log: Arc<Mutex<StubLog>>,
}

impl RawConnection for StubConnection {
    fn open_session(&self, _config: &str) -> EngineResult<Box<dyn RawSession>> {
        Ok(open_stub_session(&self.ids, &self.log))
    }

    fn checkpoint(&self, _config: &str) -> EngineResult<()> {
        Ok(())
    }

    fn load_extension(&self, path: &Path, _config: &str) -> EngineResult<()> {
        Err(EngineError::extension(path, "stub engine has no extensions"))
    }

    fn statistics(&self) -> EngineResult<Vec<(String, u64)>> {
        Ok(Vec::new())
    }

    fn close(&mut self, _config: &str) -> EngineResult<()> {
        self.log.lock().connections_closed += 1;
        Ok(())
    }
}

struct StubSession {
    ordinal: usize,
    native_id: Option<String>,
    log: Arc<Mutex<StubLog>>,
}

impl RawSession for StubSession {
    fn native_id(&self) -> Option<String> {
        self.native_id.clone()
    }

    fn create(&self, _uri: &str, _config: &str) -> EngineResult<()> {
        Ok(())
    }

    fn open_cursor(&self, uri: &str, _config: &str) -> EngineResult<Box<dyn RawCursor>> {
        Err(EngineError::not_supported(format!("stub engine cannot open {uri}")))
    }

    fn begin_transaction(&self, _config: &str) -> EngineResult<()> {
        Ok(())
    }

    fn commit_transaction(&self, _config: &str) -> EngineResult<()> {
        Ok(())
    }

    fn rollback_transaction(&self, _config: &str) -> EngineResult<()> {
        Ok(())
    }

    fn drop_object(&self, _uri: &str, _config: &str) -> EngineResult<()> {
        Ok(())
    }

    fn compact(&self, _uri: &str, _config: &str) -> EngineResult<()> {
        Ok(())
    }

    fn close(&mut self, _config: &str) -> EngineResult<()> {
        *self.log.lock().session_closes.entry(self.ordinal).or_insert(0) += 1;
        Ok(())
    }
}
