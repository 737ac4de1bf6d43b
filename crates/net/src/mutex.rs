// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cross-worker accept mutex.
//!
//! At most one worker process may sit in accept on the shared listener set;
//! waking every worker for one connection ("thundering herd") starves the
//! losers and, with multiple listeners, can deadlock acceptance entirely.
//! Both backends are kernel locks released automatically when the holding
//! process exits, so a worker dying mid-critical-section cannot wedge the
//! pool.
//!
//! The supervisor creates the lock file (mode 0600) at init; every worker
//! opens it by path before its first lock. Die-events arriving inside the
//! critical section are deferred by the worker until after `unlock`.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

use fs2::FileExt;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use nix::libc;

use hearth_core::AcceptMutexKind;

use crate::error::NetError;

/// Cross-process mutual exclusion around accept.
pub trait AcceptMutex: Send + Sync {
    /// Block until this process holds the lock.
    fn lock(&self) -> Result<(), NetError>;

    fn unlock(&self) -> Result<(), NetError>;
}

/// Supervisor-side: create (or truncate) the lock file with owner-only
/// permissions. Idempotent across restarts.
pub fn create_lock_file(path: &Path) -> Result<(), NetError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| NetError::LockFile { path: path.to_path_buf(), source: e })?;
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map(|_| ())
        .map_err(|e| NetError::LockFile { path: path.to_path_buf(), source: e })
}

/// Supervisor-side: remove the lock file at final shutdown.
pub fn remove_lock_file(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Worker-side: open the configured backend against the lock file.
pub fn attach_mutex(
    kind: AcceptMutexKind,
    path: &Path,
) -> Result<Arc<dyn AcceptMutex>, NetError> {
    match kind {
        AcceptMutexKind::Flock => Ok(Arc::new(FlockMutex::attach(path)?)),
        AcceptMutexKind::Fcntl => attach_fcntl(path),
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn attach_fcntl(path: &Path) -> Result<Arc<dyn AcceptMutex>, NetError> {
    Ok(Arc::new(FcntlMutex::attach(path)?))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn attach_fcntl(path: &Path) -> Result<Arc<dyn AcceptMutex>, NetError> {
    tracing::warn!("fcntl accept mutex unsupported here, falling back to flock");
    Ok(Arc::new(FlockMutex::attach(path)?))
}

/// Acquire on the blocking pool so a contended lock does not stall the
/// worker's runtime (signal events must still be observable while queued).
pub async fn acquire(mutex: Arc<dyn AcceptMutex>) -> Result<(), NetError> {
    tokio::task::spawn_blocking(move || mutex.lock())
        .await
        .map_err(|e| NetError::Mutex(std::io::Error::other(e)))?
}

fn open_lock_file(path: &Path) -> Result<File, NetError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| NetError::LockFile { path: path.to_path_buf(), source: e })
}

/// `flock`-based backend. Distinct opens of the same file conflict, and the
/// kernel drops the lock when the holder's fd table goes away.
#[derive(Debug)]
pub struct FlockMutex {
    file: File,
}

impl FlockMutex {
    pub fn attach(path: &Path) -> Result<Self, NetError> {
        Ok(Self { file: open_lock_file(path)? })
    }
}

impl AcceptMutex for FlockMutex {
    fn lock(&self) -> Result<(), NetError> {
        loop {
            match self.file.lock_exclusive() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NetError::Mutex(e)),
            }
        }
    }

    fn unlock(&self) -> Result<(), NetError> {
        FileExt::unlock(&self.file).map_err(NetError::Mutex)
    }
}

/// `fcntl` advisory-record-lock backend.
///
/// Note: fcntl locks are per-process, so two handles inside one process do
/// not exclude each other; exclusion only applies across worker processes,
/// which is the only place this mutex is used.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub struct FcntlMutex {
    file: File,
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl FcntlMutex {
    pub fn attach(path: &Path) -> Result<Self, NetError> {
        Ok(Self { file: open_lock_file(path)? })
    }

    fn whole_file(kind: libc::c_short) -> libc::flock {
        libc::flock {
            l_type: kind,
            l_whence: libc::SEEK_SET as libc::c_short,
            l_start: 0,
            l_len: 0,
            l_pid: 0,
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl AcceptMutex for FcntlMutex {
    fn lock(&self) -> Result<(), NetError> {
        use std::os::fd::AsRawFd;
        let fl = Self::whole_file(libc::F_WRLCK as libc::c_short);
        loop {
            match fcntl(self.file.as_raw_fd(), FcntlArg::F_SETLKW(&fl)) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(NetError::Mutex(std::io::Error::from(e))),
            }
        }
    }

    fn unlock(&self) -> Result<(), NetError> {
        use std::os::fd::AsRawFd;
        let fl = Self::whole_file(libc::F_UNLCK as libc::c_short);
        fcntl(self.file.as_raw_fd(), FcntlArg::F_SETLK(&fl))
            .map(|_| ())
            .map_err(|e| NetError::Mutex(std::io::Error::from(e)))
    }
}

#[cfg(test)]
#[path = "mutex_tests.rs"]
mod tests;
