//! Error types for engine operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by an engine through the raw capability surface.
///
/// `NotFound` and `NotPositioned` are ordinary outcomes of lookups and scans;
/// callers usually translate them into an absent value rather than failing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested key does not exist, or a scan ran off the end.
    #[error("item not found")]
    NotFound,

    /// The cursor has no current record to read.
    #[error("cursor is not positioned on a record")]
    NotPositioned,

    /// An insert found the key already present.
    #[error("duplicate key")]
    DuplicateKey,

    /// A write conflicted with a concurrent transaction.
    ///
    /// The running transaction must be rolled back.
    #[error("conflict between concurrent operations")]
    Conflict,

    /// The object is in use.
    #[error("resource busy: {message}")]
    Busy {
        /// What is busy and why.
        message: String,
    },

    /// An argument was invalid for the current state.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A configuration string was malformed or named an unknown key.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The named object does not exist.
    #[error("no such object: {uri}")]
    NoSuchObject {
        /// URI of the missing object.
        uri: String,
    },

    /// The operation is not supported by this object.
    #[error("operation not supported: {message}")]
    NotSupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// The handle (or its parent) has been closed.
    #[error("handle is closed")]
    Closed,

    /// Another connection holds the database lock.
    #[error("database locked: another connection holds {}", path.display())]
    Locked {
        /// Path of the lock file.
        path: PathBuf,
    },

    /// An extension module could not be loaded.
    #[error("cannot load extension {}: {reason}", path.display())]
    Extension {
        /// Path passed to the loader.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// A checkpoint image failed validation.
    #[error("checkpoint corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Creates a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a missing object error.
    pub fn no_such_object(uri: impl Into<String>) -> Self {
        Self::NoSuchObject { uri: uri.into() }
    }

    /// Creates a not supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Creates an extension load error.
    pub fn extension(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Extension {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Returns true for the not-found outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true if the error only says there is nothing to read.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound | Self::NotPositioned)
    }

    /// Returns true for a transaction conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_covers_not_found_and_not_positioned() {
        assert!(EngineError::NotFound.is_absent());
        assert!(EngineError::NotPositioned.is_absent());
        assert!(!EngineError::DuplicateKey.is_absent());
        assert!(!EngineError::Closed.is_absent());
    }

    #[test]
    fn messages_carry_context() {
        let err = EngineError::extension("/fake/ext.so", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "cannot load extension /fake/ext.so: No such file or directory"
        );

        let err = EngineError::no_such_object("table:missing");
        assert_eq!(err.to_string(), "no such object: table:missing");
    }
}
