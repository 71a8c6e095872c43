//! Lock-scoped access to shared files
//!
//! Every read or write of a file shared between processes goes through this
//! module. A file (or directory) is opened, an exclusive advisory lock is
//! taken on the handle, the caller's operation runs, and the lock is released
//! and the handle closed on every exit path, including unwinding.
//!
//! Lock acquisition blocks without a timeout.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs4::fs_std::FileExt;
use tracing::warn;

use super::error::{StoreError, StoreResult};

/// How a file is opened for a lock-scoped operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read only; the file must already exist
    Read,
    /// Create if missing and discard previous content once the lock is held
    Overwrite,
}

impl AccessMode {
    fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            AccessMode::Read => {
                options.read(true);
            }
            // Truncation is deferred until the lock is acquired so a process
            // waiting on the lock never sees a half-empty file.
            AccessMode::Overwrite => {
                options.read(true).write(true).create(true).truncate(false);
            }
        }
        options
    }
}

/// Exclusive advisory lock held on a borrowed file handle.
///
/// The lock is released when this guard is dropped.
#[derive(Debug)]
pub struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    /// Blocks until an exclusive lock on `file` is granted.
    ///
    /// `path` is only used for error reporting.
    pub fn acquire(file: &'a File, path: &Path) -> StoreResult<Self> {
        FileExt::lock_exclusive(file).map_err(|source| StoreError::LockAcquisition {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file })
    }

    /// The locked handle
    pub fn file(&self) -> &'a File {
        self.file
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            warn!(error = %e, "failed to release file lock");
        }
    }
}

/// Runs `op` on the file at `path` while holding an exclusive lock on it.
///
/// Returns the operation's result. Fails with [`StoreError::ResourceOpen`]
/// or [`StoreError::LockAcquisition`] when the file cannot be opened or
/// locked, in which case `op` is never called.
pub fn with_file_lock<T, F>(path: &Path, mode: AccessMode, op: F) -> StoreResult<T>
where
    F: FnOnce(&File) -> io::Result<T>,
{
    let file = mode
        .open_options()
        .open(path)
        .map_err(|source| StoreError::ResourceOpen {
            path: path.to_path_buf(),
            source,
        })?;

    let lock = FileLock::acquire(&file, path)?;
    if mode == AccessMode::Overwrite {
        lock.file().set_len(0)?;
    }
    let result = op(lock.file())?;

    // Release before the handle closes at end of scope.
    drop(lock);
    Ok(result)
}

/// Runs `op` while holding an exclusive lock on the directory at `path`.
///
/// Directory handles can only be locked on Unix; elsewhere the open fails
/// with [`StoreError::ResourceOpen`].
pub fn with_dir_lock<T, F>(path: &Path, op: F) -> StoreResult<T>
where
    F: FnOnce(&Path) -> T,
{
    let handle = File::open(path).map_err(|source| StoreError::ResourceOpen {
        path: path.to_path_buf(),
        source,
    })?;

    let lock = FileLock::acquire(&handle, path)?;
    let result = op(path);
    drop(lock);
    Ok(result)
}
