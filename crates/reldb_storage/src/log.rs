//! Commit log backends.
//!
//! The store keeps its tree in memory and persists every committed write
//! transaction as one frame appended to a [`LogBackend`]. Backends are opaque
//! byte logs: they know nothing about frames or buckets.

use crate::error::StorageResult;
use parking_lot::RwLock;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// An append-only byte log.
///
/// # Invariants
///
/// - `append` writes after all previously appended bytes
/// - `read_all` returns every byte appended since the last `reset`
/// - after `sync` returns, appended bytes survive process termination
/// - `replace` is atomic: a crash leaves either the old or the new contents
pub trait LogBackend: Send + Sync {
    /// Appends bytes to the end of the log and returns the offset they start at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Reads the complete log.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Makes appended bytes durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Current log length in bytes.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if the log holds no bytes.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops every byte after `len`.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;

    /// Atomically swaps the whole log for `data` and makes it durable.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}

/// An in-memory log.
///
/// Clones share the same bytes, which lets tests close a store and open a new
/// one over the same log to exercise recovery.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the raw log bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites the raw log bytes. Used to simulate torn or corrupted writes.
    pub fn set_bytes(&self, bytes: Vec<u8>) {
        *self.data.write() = bytes;
    }
}

impl LogBackend for MemoryLog {
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.data.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.read().clone())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut bytes = self.data.write();
        let len = usize::try_from(len).unwrap_or(usize::MAX).min(bytes.len());
        bytes.truncate(len);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        *self.data.write() = data.to_vec();
        Ok(())
    }
}

/// A file-backed log.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileLog {
    /// Opens or creates the log file, creating parent directories if needed.
    ///
    /// A replacement file left behind by an interrupted [`replace`](LogBackend::replace)
    /// is removed; the log itself still holds the contents from before it.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = temp_path(path);
        if temp.exists() {
            warn!(path = %temp.display(), "removing unfinished log replacement");
            fs::remove_file(&temp)?;
        }
        let file = open_rw(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogBackend for FileLog {
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.len;
        if data.is_empty() {
            return Ok(offset);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        self.len += data.len() as u64;
        Ok(offset)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        file.take(self.len).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.len)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let len = len.min(self.len);
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        Ok(())
    }

    /// Writes `data` to a sibling temp file, syncs it, renames it over the
    /// log and syncs the directory.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let temp = temp_path(&self.path);
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &self.path)?;
        sync_parent(&self.path)?;

        self.file = open_rw(&self.path)?;
        self.len = data.len() as u64;
        Ok(())
    }
}

fn open_rw(path: &Path) -> StorageResult<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> StorageResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

// NTFS journals the rename; directories cannot be opened for fsync.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_log_append_offsets() {
        let mut log = MemoryLog::new();
        assert_eq!(log.append(b"abc").unwrap(), 0);
        assert_eq!(log.append(b"de").unwrap(), 3);
        assert_eq!(log.read_all().unwrap(), b"abcde");
        assert_eq!(log.len().unwrap(), 5);
    }

    #[test]
    fn memory_log_clones_share_bytes() {
        let mut log = MemoryLog::new();
        let other = log.clone();
        log.append(b"shared").unwrap();
        assert_eq!(other.bytes(), b"shared");
    }

    #[test]
    fn memory_log_truncate() {
        let mut log = MemoryLog::new();
        log.append(b"hello world").unwrap();
        log.truncate(5).unwrap();
        assert_eq!(log.bytes(), b"hello");
        log.truncate(100).unwrap();
        assert_eq!(log.bytes(), b"hello");
    }

    #[test]
    fn file_log_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.log");
        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(b"persist").unwrap();
            log.sync().unwrap();
        }
        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.len().unwrap(), 7);
        assert_eq!(log.read_all().unwrap(), b"persist");
    }

    #[test]
    fn memory_log_replace_swaps_contents() {
        let mut log = MemoryLog::new();
        log.append(b"old frames").unwrap();
        log.replace(b"snap").unwrap();
        assert_eq!(log.bytes(), b"snap");
        assert_eq!(log.append(b"!").unwrap(), 4);
    }

    #[test]
    fn file_log_replace_then_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        let mut log = FileLog::open(&path).unwrap();
        log.append(b"old frames").unwrap();
        log.replace(b"snap").unwrap();
        assert_eq!(log.len().unwrap(), 4);
        assert_eq!(log.append(b"+tail").unwrap(), 4);
        log.sync().unwrap();
        assert!(!temp_path(&path).exists());

        let reopened = FileLog::open(&path).unwrap();
        assert_eq!(reopened.read_all().unwrap(), b"snap+tail");
    }

    #[test]
    fn leftover_replacement_does_not_clobber_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(b"committed").unwrap();
            log.sync().unwrap();
        }
        // A checkpoint that died before its rename.
        fs::write(temp_path(&path), b"half").unwrap();

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.read_all().unwrap(), b"committed");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn file_log_truncate_to_zero() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(&dir.path().join("store.log")).unwrap();
        log.append(b"data").unwrap();
        log.truncate(0).unwrap();
        assert!(log.is_empty().unwrap());
        assert_eq!(log.append(b"x").unwrap(), 0);
    }
}
