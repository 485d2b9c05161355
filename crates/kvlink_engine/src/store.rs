//! Checkpoint storage.
//!
//! Stores are opaque frame logs: they keep checkpoint images and hand back
//! the newest valid one. The engine owns the image format.
//!
//! On disk each image is one frame:
//!
//! ```text
//! | len u32 | crc32 u32 | image (len bytes) |
//! ```
//!
//! A frame that is short or fails its checksum marks a torn tail; it and
//! everything after it are truncated on open.

use crate::error::EngineResult;
use crate::image::compute_crc32;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of a frame header.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Frames kept before the file is rewritten with only the newest image.
pub const REWRITE_AFTER_FRAMES: usize = 8;

/// A durable home for checkpoint images.
pub trait CheckpointStore: Send + fmt::Debug {
    /// The newest valid image, if any.
    fn latest(&self) -> Option<&[u8]>;

    /// Durably stores a new image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be made durable.
    fn append(&mut self, image: &[u8]) -> EngineResult<()>;

    /// Number of images currently held.
    fn image_count(&self) -> usize;
}

/// Keeps images in memory; used for `in_memory` databases.
#[derive(Debug, Default)]
pub struct MemoryStore {
    latest: Option<Vec<u8>>,
    count: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryStore {
    fn latest(&self) -> Option<&[u8]> {
        self.latest.as_deref()
    }

    fn append(&mut self, image: &[u8]) -> EngineResult<()> {
        self.latest = Some(image.to_vec());
        self.count += 1;
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.count
    }
}

/// Appends framed images to a file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    temp_path: PathBuf,
    file: File,
    latest: Option<Vec<u8>>,
    frames: usize,
}

impl FileStore {
    /// Opens or creates the checkpoint file, truncating any torn tail.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read or repaired.
    pub fn open(path: &Path, temp_path: &Path) -> EngineResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let (frames, valid_end) = scan_frames(&data);
        if valid_end < data.len() {
            tracing::warn!(
                path = %path.display(),
                valid_bytes = valid_end,
                torn_bytes = data.len() - valid_end,
                "truncating torn checkpoint tail"
            );
            file.set_len(valid_end as u64)?;
            file.sync_all()?;
        }

        let latest = frames.last().map(|range| data[range.clone()].to_vec());
        Ok(Self {
            path: path.to_path_buf(),
            temp_path: temp_path.to_path_buf(),
            file,
            latest,
            frames: frames.len(),
        })
    }

    /// Path of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rewrite(&mut self, frame: &[u8]) -> EngineResult<()> {
        let mut temp = File::create(&self.temp_path)?;
        temp.write_all(frame)?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&self.temp_path, &self.path)?;
        sync_parent(&self.path)?;

        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.frames = 1;
        Ok(())
    }
}

impl CheckpointStore for FileStore {
    fn latest(&self) -> Option<&[u8]> {
        self.latest.as_deref()
    }

    fn append(&mut self, image: &[u8]) -> EngineResult<()> {
        let frame = encode_frame(image);
        if self.frames >= REWRITE_AFTER_FRAMES {
            tracing::debug!(frames = self.frames, "rewriting checkpoint file");
            self.rewrite(&frame)?;
        } else {
            self.file.seek(SeekFrom::End(0))?;
            self.file.write_all(&frame)?;
            self.file.sync_all()?;
            self.frames += 1;
        }
        self.latest = Some(image.to_vec());
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.frames
    }
}

/// Frames an image with its length and checksum.
#[must_use]
pub fn encode_frame(image: &[u8]) -> Vec<u8> {
    let len = u32::try_from(image.len()).unwrap_or(u32::MAX);
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + image.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&compute_crc32(image).to_le_bytes());
    frame.extend_from_slice(image);
    frame
}

/// Returns the payload ranges of every valid frame and the end of the last one.
fn scan_frames(data: &[u8]) -> (Vec<std::ops::Range<usize>>, usize) {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset + FRAME_HEADER_SIZE <= data.len() {
        let header = &data[offset..offset + FRAME_HEADER_SIZE];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let start = offset + FRAME_HEADER_SIZE;
        let Some(end) = start.checked_add(len).filter(|end| *end <= data.len()) else {
            break;
        };
        if compute_crc32(&data[start..end]) != crc {
            break;
        }
        frames.push(start..end);
        offset = end;
    }
    (frames, offset)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> EngineResult<()> {
    Ok(())
}
