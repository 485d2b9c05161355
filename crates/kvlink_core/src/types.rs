//! Core type definitions for kvlink handles.

use std::fmt;

/// Identifier of a session within its connection.
///
/// Parsed from the identifier string the engine attaches to each session
/// handle. Identifiers are non-zero and never reused by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Parses an engine-native session identifier.
    ///
    /// Returns `None` for empty, zero, or non-decimal identifiers.
    #[must_use]
    pub fn from_native(native: &str) -> Option<Self> {
        if native.is_empty() || !native.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match native.parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(id) => Some(Self(id)),
        }
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded key/value pair read from a cursor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
    /// The record key.
    pub key: String,
    /// The record value.
    pub value: String,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.key, self.value)
    }
}

/// Where a `search_near` landed relative to the search key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearMatch {
    /// The cursor is on the search key itself.
    Exact,
    /// The cursor is on the nearest larger key.
    Larger,
    /// The cursor is on the nearest smaller key.
    Smaller,
}

impl NearMatch {
    /// Maps the engine's comparison result.
    #[must_use]
    pub fn from_exact(exact: i32) -> Self {
        match exact {
            0 => Self::Exact,
            e if e > 0 => Self::Larger,
            _ => Self::Smaller,
        }
    }

    /// The comparison as `0`, `1` or `-1`.
    #[must_use]
    pub fn exact(self) -> i32 {
        match self {
            Self::Exact => 0,
            Self::Larger => 1,
            Self::Smaller => -1,
        }
    }

    /// Returns true for an exact match.
    #[must_use]
    pub fn is_exact(self) -> bool {
        self == Self::Exact
    }
}
