//! Error types for kvlink handles.

use crate::types::SessionId;
use kvlink_engine::EngineError;
use std::path::PathBuf;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Result type for handle operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by [`Connection`](crate::Connection),
/// [`Session`](crate::Session) and [`Cursor`](crate::Cursor).
///
/// Lookups that find nothing are not errors; they return `None`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The engine reported a failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The engine returned a session without a usable identifier.
    #[error("session missing native identifier")]
    MissingSessionId,

    /// The engine reused an identifier that is still tracked.
    #[error("duplicate session identifier {0}")]
    DuplicateSessionId(SessionId),

    /// A session wrapper was built from a handle without an identifier.
    #[error("invalid session: native identifier missing")]
    InvalidSession,

    /// The connection has not been opened yet.
    #[error("connection is not open")]
    NotOpen,

    /// `open` was called on an open connection.
    #[error("connection is already open")]
    AlreadyOpen,

    /// The connection was closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The session was closed, directly or by its connection.
    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    /// The cursor was closed.
    #[error("cursor on {uri} is closed")]
    CursorClosed {
        /// URI the cursor was opened on.
        uri: String,
    },

    /// An explicit extension load failed.
    #[error("failed to load extension {}: {source}", path.display())]
    ExtensionLoad {
        /// Path passed to the loader.
        path: PathBuf,
        /// The engine's report.
        #[source]
        source: EngineError,
    },

    /// A typed configuration could not be parsed.
    #[error("invalid {context} configuration: {message}")]
    InvalidConfig {
        /// The operation the configuration belongs to.
        context: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// A stored item was not valid UTF-8.
    #[error("stored {what} is not valid UTF-8: {source}")]
    Decode {
        /// `"key"` or `"value"`.
        what: &'static str,
        /// The decoding failure.
        #[source]
        source: FromUtf8Error,
    },
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(context: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            context,
            message: message.into(),
        }
    }

    /// Creates an extension load error.
    pub fn extension_load(path: impl Into<PathBuf>, source: EngineError) -> Self {
        Self::ExtensionLoad {
            path: path.into(),
            source,
        }
    }

    /// The underlying engine error, if this is one.
    #[must_use]
    pub fn engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the engine reported a duplicate key.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Engine(EngineError::DuplicateKey))
    }

    /// Returns true if the engine reported a missing key.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Engine(EngineError::NotFound))
    }

    /// Returns true for a transaction conflict.
    ///
    /// The transaction must be rolled back; retrying is up to the caller.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Engine(EngineError::Conflict))
    }

    /// Returns true if the target object is in use.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Engine(EngineError::Busy { .. }))
    }
}
