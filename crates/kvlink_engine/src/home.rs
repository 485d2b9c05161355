//! Database home directory management.
//!
//! ```text
//! <home>/
//! ├─ KVLINK           # Marker written when the database is created
//! ├─ KVLINK.lock      # Advisory lock, held while a connection is open
//! ├─ KVLINK.ckpt      # Checkpoint images
//! └─ KVLINK.ckpt.tmp  # Scratch file while the checkpoint file is rewritten
//! ```

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const MARKER_FILE: &str = "KVLINK";
const LOCK_FILE: &str = "KVLINK.lock";
const CHECKPOINT_FILE: &str = "KVLINK.ckpt";
const CHECKPOINT_TEMP: &str = "KVLINK.ckpt.tmp";

/// How to treat the home when opening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HomeOptions {
    /// Create the directory and database if missing.
    pub create: bool,
    /// Fail if the database already exists.
    pub exclusive: bool,
}

/// An open database home holding the exclusive lock.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct Home {
    path: PathBuf,
    _lock_file: File,
    created: bool,
}

impl Home {
    /// Opens a home directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing without `create`, the database is
    /// missing without `create` or present with `exclusive`, or another
    /// connection holds the lock.
    pub fn open(path: &Path, options: HomeOptions) -> EngineResult<Self> {
        if !path.exists() {
            if options.create {
                fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::invalid_argument(format!(
                    "database home does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(EngineError::invalid_argument(format!(
                "database home is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked { path: lock_path });
        }

        let marker = path.join(MARKER_FILE);
        let exists = marker.exists();
        if exists && options.exclusive {
            return Err(EngineError::invalid_argument(format!(
                "database already exists: {}",
                path.display()
            )));
        }
        if !exists {
            if !options.create {
                return Err(EngineError::invalid_argument(format!(
                    "no database found in {}",
                    path.display()
                )));
            }
            fs::write(&marker, format!("kvlink {}\n", env!("CARGO_PKG_VERSION")))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            created: !exists,
        })
    }

    /// The home directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if this open created the database.
    #[must_use]
    pub fn created(&self) -> bool {
        self.created
    }

    /// Path of the checkpoint file.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.path.join(CHECKPOINT_FILE)
    }

    /// Path of the checkpoint scratch file.
    #[must_use]
    pub fn checkpoint_temp_path(&self) -> PathBuf {
        self.path.join(CHECKPOINT_TEMP)
    }
}
