//! Store directory layout and locking.
//!
//! ```text
//! <store path>/
//! ├─ LOCK        # advisory lock, one open store per directory
//! └─ commit.log  # framed commit log
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "commit.log";

/// An open store directory. The lock is held until this value is dropped.
#[derive(Debug)]
pub(crate) struct StoreDir {
    path: PathBuf,
    _lock: File,
}

impl StoreDir {
    /// Opens `path`, creating it when allowed, and takes the directory lock.
    ///
    /// Fails with [`CoreError::StoreLocked`] if another handle holds it.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::invalid_operation(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}
