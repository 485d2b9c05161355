//! Checkpoint image encoding.
//!
//! An image is the complete committed state of a database at one commit
//! sequence number:
//!
//! ```text
//! magic "KVCK" | version u16 | last_commit u64 | name (flag u8, str)
//! table_count u32 | { name str | config str | row_count u64 | { key bytes | value bytes } }
//! index_count u32 | { table str | name str | config str }
//! ```
//!
//! Integers are little-endian; `str` and `bytes` carry a `u32` length prefix.
//! Images are framed with a CRC32 by the checkpoint store.

use crate::catalog::Row;
use crate::error::{EngineError, EngineResult};
use crate::mvcc::CommitSeq;

/// Magic bytes at the start of every image.
pub const IMAGE_MAGIC: [u8; 4] = *b"KVCK";

/// Current image version.
pub const IMAGE_VERSION: u16 = 1;

/// A table captured in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableImage {
    /// Table name.
    pub name: String,
    /// Canonical creation configuration.
    pub config: String,
    /// Committed rows in stored form, in key order.
    pub rows: Vec<Row>,
}

/// An index captured in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexImage {
    /// Owning table.
    pub table: String,
    /// Index name.
    pub name: String,
    /// Canonical creation configuration.
    pub config: String,
}

/// The committed state of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointImage {
    /// Commit sequence the image was taken at.
    pub last_commit: CommitSeq,
    /// Optional checkpoint name.
    pub name: Option<String>,
    /// Tables.
    pub tables: Vec<TableImage>,
    /// Indexes.
    pub indexes: Vec<IndexImage>,
}

impl CheckpointImage {
    /// Encodes the image.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if an item or count exceeds `u32::MAX`.
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&IMAGE_MAGIC);
        buf.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.last_commit.to_le_bytes());

        match &self.name {
            Some(name) => {
                buf.push(1);
                put_bytes(&mut buf, name.as_bytes())?;
            }
            None => buf.push(0),
        }

        put_len(&mut buf, self.tables.len())?;
        for table in &self.tables {
            put_bytes(&mut buf, table.name.as_bytes())?;
            put_bytes(&mut buf, table.config.as_bytes())?;
            buf.extend_from_slice(&(table.rows.len() as u64).to_le_bytes());
            for (key, value) in &table.rows {
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
        }

        put_len(&mut buf, self.indexes.len())?;
        for index in &self.indexes {
            put_bytes(&mut buf, index.table.as_bytes())?;
            put_bytes(&mut buf, index.name.as_bytes())?;
            put_bytes(&mut buf, index.config.as_bytes())?;
        }

        Ok(buf)
    }

    /// Decodes an image.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the bytes are not a complete image.
    pub fn decode(data: &[u8]) -> EngineResult<Self> {
        let mut reader = Reader { data, pos: 0 };

        if reader.take(4)? != IMAGE_MAGIC {
            return Err(EngineError::corrupted("invalid checkpoint magic"));
        }
        let version = reader.u16()?;
        if version > IMAGE_VERSION {
            return Err(EngineError::corrupted(format!(
                "unsupported checkpoint version: {version}"
            )));
        }
        let last_commit = reader.u64()?;
        let name = match reader.u8()? {
            0 => None,
            1 => Some(reader.string()?),
            flag => {
                return Err(EngineError::corrupted(format!(
                    "invalid checkpoint name flag: {flag}"
                )))
            }
        };

        let table_count = reader.u32()?;
        let mut tables = Vec::new();
        for _ in 0..table_count {
            let name = reader.string()?;
            let config = reader.string()?;
            let row_count = reader.u64()?;
            let mut rows = Vec::new();
            for _ in 0..row_count {
                let key = reader.bytes()?;
                let value = reader.bytes()?;
                rows.push((key, value));
            }
            tables.push(TableImage { name, config, rows });
        }

        let index_count = reader.u32()?;
        let mut indexes = Vec::new();
        for _ in 0..index_count {
            indexes.push(IndexImage {
                table: reader.string()?,
                name: reader.string()?,
                config: reader.string()?,
            });
        }

        if reader.pos != data.len() {
            return Err(EngineError::corrupted(format!(
                "{} trailing bytes after checkpoint image",
                data.len() - reader.pos
            )));
        }

        Ok(Self {
            last_commit,
            name,
            tables,
            indexes,
        })
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) -> EngineResult<()> {
    let len = u32::try_from(len).map_err(|_| {
        EngineError::invalid_argument(format!("{len} bytes is too large for a checkpoint image"))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> EngineResult<()> {
    put_len(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> EngineResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| EngineError::corrupted("checkpoint image truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> EngineResult<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn bytes(&mut self) -> EngineResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> EngineResult<String> {
        String::from_utf8(self.bytes()?)
            .map_err(|_| EngineError::corrupted("invalid UTF-8 in checkpoint image"))
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
