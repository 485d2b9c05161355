//! Cursors: positioning and data access over one object.
//!
//! The string API encodes keys and values as UTF-8 and decodes strictly.
//! Misses and exhausted scans return `None`:
//!
//! ```rust
//! use kvlink_core::config::{ConnectionConfig, TableConfig};
//! use kvlink_core::extensions::ExtensionDiscovery;
//! use kvlink_core::Connection;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let conn = Connection::new();
//! conn.open(dir.path(), &ConnectionConfig::new().extensions(ExtensionDiscovery::disabled()))
//!     .unwrap();
//! let session = conn.open_session().unwrap();
//! session.create_table("greetings", &TableConfig::new()).unwrap();
//!
//! let mut cursor = session.open_cursor("greetings").unwrap();
//! cursor.set("hello", "world").unwrap();
//! cursor.insert().unwrap();
//! assert_eq!(cursor.search("hello").unwrap().as_deref(), Some("world"));
//! assert_eq!(cursor.search("goodbye").unwrap(), None);
//! ```

use crate::codec::{absent, decode, decode_record};
use crate::error::{CoreError, CoreResult};
use crate::session::Session;
use crate::types::{NearMatch, Record};
use kvlink_engine::RawCursor;
use std::fmt;

/// A cursor opened from a [`Session`].
///
/// Positioning follows the engine: a cursor starts unpositioned; `search`,
/// `search_near`, `next` and `prev` position it; a miss or an exhausted
/// scan leaves it unpositioned again.
pub struct Cursor<'s> {
    session: &'s Session,
    raw: Option<Box<dyn RawCursor>>,
    uri: String,
}

impl<'s> Cursor<'s> {
    pub(crate) fn new(session: &'s Session, raw: Box<dyn RawCursor>) -> Self {
        let uri = raw.uri().to_string();
        Self {
            session,
            raw: Some(raw),
            uri,
        }
    }

    /// URI the cursor was opened on.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The session that owns this cursor.
    #[must_use]
    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Returns true once [`Cursor::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.raw.is_none()
    }

    fn with<T>(&mut self, f: impl FnOnce(&mut dyn RawCursor) -> CoreResult<T>) -> CoreResult<T> {
        let Some(raw) = self.raw.as_deref_mut() else {
            return Err(CoreError::CursorClosed {
                uri: self.uri.clone(),
            });
        };
        self.session.slot().with(self.session.id(), |_| f(raw))
    }

    /// Stages a key and value for [`Cursor::insert`] or [`Cursor::update`].
    ///
    /// # Errors
    ///
    /// Fails if an item cannot be stored in the object's format, for
    /// example a string containing NUL in an `S` column.
    pub fn set(&mut self, key: &str, value: &str) -> CoreResult<()> {
        self.with(|raw| {
            raw.set_key(key.as_bytes())?;
            raw.set_value(value.as_bytes())?;
            Ok(())
        })
    }

    /// Stages only a key, for a keyed [`Cursor::remove`].
    ///
    /// # Errors
    ///
    /// Fails if the key cannot be stored in the object's format.
    pub fn set_key(&mut self, key: &str) -> CoreResult<()> {
        self.with(|raw| Ok(raw.set_key(key.as_bytes())?))
    }

    /// Inserts the staged pair.
    ///
    /// # Errors
    ///
    /// Fails with a duplicate-key error if the key exists and the cursor
    /// was not opened with `overwrite`.
    pub fn insert(&mut self) -> CoreResult<()> {
        self.with(|raw| Ok(raw.insert()?))
    }

    /// Replaces the value of the staged key.
    ///
    /// # Errors
    ///
    /// Fails with a not-found error if the key is missing and the cursor
    /// was not opened with `overwrite`.
    pub fn update(&mut self) -> CoreResult<()> {
        self.with(|raw| Ok(raw.update()?))
    }

    /// Removes the staged key, or the record under the cursor.
    ///
    /// Returns `false` if there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Fails if neither a key is staged nor the cursor is positioned.
    pub fn remove(&mut self) -> CoreResult<bool> {
        self.with(|raw| Ok(absent(raw.remove())?.is_some()))
    }

    /// Looks up `key`, positioning the cursor on it when found.
    ///
    /// # Errors
    ///
    /// Fails on engine errors or a value that is not UTF-8.
    pub fn search(&mut self, key: &str) -> CoreResult<Option<String>> {
        self.with(|raw| {
            raw.set_key(key.as_bytes())?;
            if absent(raw.search())?.is_none() {
                return Ok(None);
            }
            decode("value", raw.get_value()?).map(Some)
        })
    }

    /// Positions the cursor on `key` or its nearest neighbour.
    ///
    /// Returns `None` only if the object is empty.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn search_near(&mut self, key: impl AsRef<[u8]>) -> CoreResult<Option<NearMatch>> {
        self.with(|raw| {
            raw.set_key(key.as_ref())?;
            Ok(absent(raw.search_near())?.map(NearMatch::from_exact))
        })
    }

    /// Moves to the next record in key order.
    ///
    /// Returns `None` when the scan is exhausted; the cursor is then
    /// unpositioned and the next call starts from the first record.
    ///
    /// # Errors
    ///
    /// Fails on engine errors or items that are not UTF-8.
    pub fn next(&mut self) -> CoreResult<Option<Record>> {
        self.with(|raw| {
            if absent(raw.next())?.is_none() {
                return Ok(None);
            }
            decode_record(raw.get_key()?, raw.get_value()?).map(Some)
        })
    }

    /// Moves to the previous record in key order.
    ///
    /// Returns `None` when the scan is exhausted.
    ///
    /// # Errors
    ///
    /// Fails on engine errors or items that are not UTF-8.
    pub fn prev(&mut self) -> CoreResult<Option<Record>> {
        self.with(|raw| {
            if absent(raw.prev())?.is_none() {
                return Ok(None);
            }
            decode_record(raw.get_key()?, raw.get_value()?).map(Some)
        })
    }

    /// Unpositions the cursor and clears anything staged.
    ///
    /// # Errors
    ///
    /// Fails if the cursor or its session is closed.
    pub fn reset(&mut self) -> CoreResult<()> {
        self.with(|raw| Ok(raw.reset()?))
    }

    /// The record under the cursor.
    ///
    /// Returns `None` when unpositioned, or when the record under the
    /// cursor was removed.
    ///
    /// # Errors
    ///
    /// Fails on engine errors or items that are not UTF-8.
    pub fn get(&mut self) -> CoreResult<Option<Record>> {
        self.with(|raw| match (absent(raw.get_key())?, absent(raw.get_value())?) {
            (Some(key), Some(value)) => decode_record(key, value).map(Some),
            _ => Ok(None),
        })
    }

    /// The key under the cursor, without text decoding.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn get_raw_key(&mut self) -> CoreResult<Option<Vec<u8>>> {
        self.with(|raw| absent(raw.get_key()))
    }

    /// The value under the cursor, without text decoding.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn get_raw_value(&mut self) -> CoreResult<Option<Vec<u8>>> {
        self.with(|raw| absent(raw.get_value()))
    }

    /// Stages a key given as bytes.
    ///
    /// # Errors
    ///
    /// Fails if the bytes cannot be stored in the object's format.
    pub fn set_raw_key(&mut self, key: &[u8]) -> CoreResult<()> {
        self.with(|raw| Ok(raw.set_key(key)?))
    }

    /// Stages a value given as bytes.
    ///
    /// # Errors
    ///
    /// Fails if the bytes cannot be stored in the object's format.
    pub fn set_raw_value(&mut self, value: &[u8]) -> CoreResult<()> {
        self.with(|raw| Ok(raw.set_value(value)?))
    }

    /// Iterates forward from the current position.
    pub fn records(&mut self) -> Records<'_, 's> {
        Records {
            cursor: self,
            done: false,
        }
    }

    /// Closes the cursor. Later calls return `Ok(())`.
    ///
    /// A cursor whose session was already closed is released with the
    /// session and not touched again.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if releasing the handle fails.
    pub fn close(&mut self) -> CoreResult<()> {
        let Some(mut raw) = self.raw.take() else {
            return Ok(());
        };
        match self
            .session
            .slot()
            .with(self.session.id(), |_| Ok(raw.close()?))
        {
            Err(CoreError::SessionClosed(_)) => Ok(()),
            result => {
                tracing::debug!(session = %self.session.id(), uri = %self.uri, "cursor closed");
                result
            }
        }
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("session", &self.session.id())
            .field("uri", &self.uri)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(uri = %self.uri, error = %err, "error closing cursor on drop");
        }
    }
}

/// Iterator returned by [`Cursor::records`].
///
/// Stops after the last record, or after yielding an error.
pub struct Records<'c, 's> {
    cursor: &'c mut Cursor<'s>,
    done: bool,
}

impl Iterator for Records<'_, '_> {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
