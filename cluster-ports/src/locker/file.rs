//! Host-wide byte-range lock file.
//!
//! The lock file holds one (virtual) byte per port number. Locking port `p`
//! takes an exclusive, non-blocking `fcntl` record lock of length 1 at offset
//! `p`. The file is never written and need not be pre-sized: record locks may
//! extend past end-of-file.
//!
//! On Linux the lock is an open-file-description lock (`F_OFD_SETLK`): it
//! belongs to this locker's open file rather than to the process, so two
//! lockers in one process exclude each other and dropping one never releases
//! the other's locks. Other unix targets fall back to classic POSIX record
//! locks, which only exclude other processes: there, two choosers in one
//! process are kept apart only if they share an in-process set, as every
//! chooser from `LockingPortChooser::from_config` does. Either way the kernel
//! drops every lock when the holder dies.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::PortLocker;
use crate::error::PortError;
use crate::lock::PortLock;

#[cfg(target_os = "linux")]
const SET_LOCK: libc::c_int = libc::F_OFD_SETLK;
#[cfg(not(target_os = "linux"))]
const SET_LOCK: libc::c_int = libc::F_SETLK;

/// Cross-process port locker backed by a shared lock file.
#[derive(Debug, Clone)]
pub struct FilePortLocker {
    path: PathBuf,
    file: Arc<File>,
}

impl FilePortLocker {
    /// Open (creating if needed) the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::LockFile`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PortError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| PortError::LockFile {
                path: path.clone(),
                source,
            })?;

        tracing::debug!("Opened port-lock file {}", path.display());
        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PortLocker for FilePortLocker {
    fn try_lock(&self, port: u16) -> Result<Option<PortLock>, PortError> {
        let locked = set_lock(&self.file, port, libc::F_WRLCK as libc::c_short).map_err(
            |source| PortError::LockFile {
                path: self.path.clone(),
                source,
            },
        )?;

        if !locked {
            tracing::debug!(
                port,
                "Port locked by another holder of {}",
                self.path.display()
            );
            return Ok(None);
        }

        let file = Arc::clone(&self.file);
        Ok(Some(PortLock::new(port, move || {
            set_lock(&file, port, libc::F_UNLCK as libc::c_short).map(|_| ())
        })))
    }
}

/// Apply a non-blocking record lock of length 1 at offset `port`.
///
/// Returns `Ok(false)` if another holder's lock conflicts.
fn set_lock(file: &File, port: u16, lock_type: libc::c_short) -> io::Result<bool> {
    // Safety: `flock` is plain old data; all-zero is a valid value and also
    // the required `l_pid` for open-file-description locks.
    let mut request: libc::flock = unsafe { std::mem::zeroed() };
    request.l_type = lock_type;
    request.l_whence = libc::SEEK_SET as _;
    request.l_start = libc::off_t::from(port);
    request.l_len = 1;

    // Safety: the fd is owned by `file` and stays open for the call, and
    // `request` is a valid, initialized `flock`.
    let rc = unsafe {
        libc::fcntl(
            file.as_raw_fd(),
            SET_LOCK,
            &request as *const libc::flock,
        )
    };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EAGAIN || code == libc::EACCES => Ok(false),
        _ => Err(err),
    }
}
