// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor startup plumbing: pid file, detach, process group, logging.

use std::fs::File;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use fs2::FileExt;
use nix::unistd::{setpgid, setsid, Pid};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use hearth_core::ServerConfig;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire pid file lock: server already running?")]
    PidLockFailed(#[source] std::io::Error),

    #[error("failed to open error log {0}: {1}")]
    ErrorLog(PathBuf, #[source] std::io::Error),

    #[error("failed to spawn piped log writer {0:?}: {1}")]
    PipedLog(String, #[source] std::io::Error),

    #[error("failed to detach: {0}")]
    Detach(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Nix(#[from] nix::Error),
}

/// The pid file, held under an exclusive lock for the supervisor's lifetime.
#[derive(Debug)]
pub struct PidFile {
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl PidFile {
    /// Acquire the lock and write our pid as a single ASCII line.
    ///
    /// Opened without truncation so a lock conflict cannot wipe the running
    /// supervisor's pid.
    pub fn acquire(config: &ServerConfig) -> Result<Self, LifecycleError> {
        let path = config.pid_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive().map_err(LifecycleError::PidLockFailed)?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Self { file, path })
    }

    /// Remove the file at final shutdown. The lock dies with the process
    /// either way.
    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Make this process a process-group leader so group signals reach exactly
/// the supervisor and its children.
pub fn become_group_leader(detached: bool) -> Result<(), LifecycleError> {
    if detached {
        // Full session detach for the daemonized relaunch.
        let _ = setsid();
        return Ok(());
    }
    match setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
        Ok(()) => Ok(()),
        // Already a leader (or a session leader): nothing to do.
        Err(nix::errno::Errno::EPERM) => Ok(()),
        Err(e) => Err(LifecycleError::Nix(e)),
    }
}

/// Relaunch ourselves in the background and exit the foreground process.
///
/// The child re-enters main with `HEARTHD_DETACHED=1` set and becomes the
/// real supervisor.
pub fn detach() -> Result<(), LifecycleError> {
    let exe = std::env::current_exe().map_err(LifecycleError::Detach)?;
    Command::new(exe)
        .args(std::env::args_os().skip(1))
        .env(crate::env::DETACHED, "1")
        .stdin(Stdio::null())
        .spawn()
        .map_err(LifecycleError::Detach)?;
    Ok(())
}

/// Where the error log goes.
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    /// `|command`: a piped log writer child owns the other end.
    Piped(String),
}

pub fn log_target(config: &ServerConfig) -> LogTarget {
    match config.error_log.as_deref() {
        None => LogTarget::Stderr,
        Some(value) => match value.strip_prefix('|') {
            Some(command) => LogTarget::Piped(command.trim().to_string()),
            None => {
                let path = PathBuf::from(value);
                if path.is_absolute() {
                    LogTarget::File(path)
                } else {
                    LogTarget::File(config.server_root().join(path))
                }
            }
        },
    }
}

/// Keeps the non-blocking log writer (and any piped log child) alive.
pub struct LogGuard {
    #[allow(dead_code)]
    appender: tracing_appender::non_blocking::WorkerGuard,
    /// The piped log writer, to be registered as an other-child.
    pub piped: Option<Child>,
}

/// Point fd 2 at the configured log destination, then subscribe tracing to
/// stderr. Workers inherit fd 2 across spawn, so they need no redirection
/// of their own.
pub fn init_supervisor_logging(config: &ServerConfig) -> Result<LogGuard, LifecycleError> {
    let piped = match log_target(config) {
        LogTarget::Stderr => None,
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| LifecycleError::ErrorLog(path.clone(), e))?;
            nix::unistd::dup2(file.as_raw_fd(), 2)?;
            None
        }
        LogTarget::Piped(command) => {
            let mut child = Command::new("/bin/sh")
                .arg("-c")
                .arg(&command)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| LifecycleError::PipedLog(command.clone(), e))?;
            if let Some(stdin) = &child.stdin {
                nix::unistd::dup2(stdin.as_raw_fd(), 2)?;
            }
            Some(child)
        }
    };

    Ok(LogGuard { appender: subscribe(&config.log_filter), piped })
}

/// Worker-side logging: plain stderr, which the supervisor already pointed
/// at the right place.
pub fn init_worker_logging(config: &ServerConfig) -> LogGuard {
    LogGuard { appender: subscribe(&config.log_filter), piped: None }
}

fn subscribe(filter: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_new(filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    // A second init (tests) is harmless; the first subscriber wins.
    let _ = tracing::subscriber::set_global_default(subscriber);
    guard
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
