//! Marshaling between Rust strings and engine items.
//!
//! The string API encodes with UTF-8 and decodes strictly. Engine outcomes
//! that only mean "nothing there" become `None`.

use crate::error::{CoreError, CoreResult};
use crate::types::Record;
use kvlink_engine::EngineResult;

/// Decodes an item, failing on invalid UTF-8.
pub(crate) fn decode(what: &'static str, bytes: Vec<u8>) -> CoreResult<String> {
    String::from_utf8(bytes).map_err(|source| CoreError::Decode { what, source })
}

/// Decodes a key/value pair.
pub(crate) fn decode_record(key: Vec<u8>, value: Vec<u8>) -> CoreResult<Record> {
    Ok(Record {
        key: decode("key", key)?,
        value: decode("value", value)?,
    })
}

/// Maps not-found and not-positioned outcomes to `None`.
pub(crate) fn absent<T>(result: EngineResult<T>) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_absent() => Ok(None),
        Err(err) => Err(err.into()),
    }
}
