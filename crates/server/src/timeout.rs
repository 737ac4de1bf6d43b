// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker timeout plane.
//!
//! One outstanding deadline at a time. Instead of an alarm that unwinds the
//! stack from signal context, every suspension point is wrapped in
//! [`TimeoutPlane::guard_io`], which turns an elapsed deadline into a
//! [`TimeoutError::Expired`] value that unwinds through ordinary error
//! paths back to the worker loop.
//!
//! [`TimeoutPlane::block`] marks a scope whose I/O must not be cancelled
//! (the moral successor of the allocator critical sections). An expiry or a
//! requested exit that lands inside a blocked scope is surfaced by the
//! first [`TimeoutPlane::check`] after the outermost guard drops.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("{name} timed out")]
    Expired { name: &'static str },

    #[error("exit requested")]
    ExitRequested,
}

#[derive(Default)]
struct TimeoutState {
    deadline: Option<Instant>,
    interval: Option<Duration>,
    name: &'static str,
    blocked: u32,
    exit_after_unblock: bool,
}

/// Deadline holder for one worker. Clones share state.
#[derive(Clone, Default)]
pub struct TimeoutPlane {
    inner: Arc<Mutex<TimeoutState>>,
}

impl TimeoutPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn arm(&self, name: &'static str, interval: Duration) {
        let mut state = self.inner.lock();
        state.name = name;
        state.interval = Some(interval);
        state.deadline = Some(Instant::now() + interval);
    }

    /// Deadline whose expiry aborts the whole connection.
    pub fn hard_timeout(&self, name: &'static str, interval: Duration) {
        self.arm(name, interval);
    }

    /// Deadline whose expiry the caller may survive (the connection is
    /// marked dead but unwinding is the caller's choice).
    pub fn soft_timeout(&self, name: &'static str, interval: Duration) {
        self.arm(name, interval);
    }

    /// Deadline for the wait between keep-alive requests.
    pub fn keepalive_timeout(&self, name: &'static str, interval: Duration) {
        self.arm(name, interval);
    }

    /// Re-arm with the original interval, unless already expired.
    pub fn reset_timeout(&self) {
        let mut state = self.inner.lock();
        if let (Some(deadline), Some(interval)) = (state.deadline, state.interval) {
            if Instant::now() < deadline {
                state.deadline = Some(Instant::now() + interval);
            }
        }
    }

    /// Disarm.
    pub fn kill_timeout(&self) {
        let mut state = self.inner.lock();
        state.deadline = None;
        state.interval = None;
        state.name = "";
    }

    /// Armed interval in whole seconds, for the scoreboard's stuck-worker
    /// field. 0 when disarmed.
    pub fn timeout_len_secs(&self) -> u32 {
        self.inner
            .lock()
            .interval
            .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
            .unwrap_or(0)
    }

    /// Enter a scope whose I/O must not be cancelled.
    pub fn block(&self) -> BlockGuard {
        self.inner.lock().blocked += 1;
        BlockGuard { inner: Arc::clone(&self.inner) }
    }

    /// Ask the worker to exit once any blocked scope unwinds.
    pub fn request_exit(&self) {
        self.inner.lock().exit_after_unblock = true;
    }

    /// Checkpoint: surfaces a deadline that expired inside a blocked scope,
    /// or a deferred exit request, once no scope is active.
    pub fn check(&self) -> Result<(), TimeoutError> {
        let state = self.inner.lock();
        if state.blocked > 0 {
            return Ok(());
        }
        if state.exit_after_unblock {
            return Err(TimeoutError::ExitRequested);
        }
        if let Some(deadline) = state.deadline {
            if Instant::now() >= deadline {
                return Err(TimeoutError::Expired { name: state.name });
            }
        }
        Ok(())
    }

    /// Run a suspension point under the armed deadline.
    ///
    /// Inside a blocked scope, or with no deadline armed, the future runs
    /// unbounded. On expiry the deadline is disarmed and `Expired` is
    /// returned for the caller to propagate.
    pub async fn guard_io<F: std::future::Future>(
        &self,
        fut: F,
    ) -> Result<F::Output, TimeoutError> {
        let (deadline, name, blocked) = {
            let state = self.inner.lock();
            (state.deadline, state.name, state.blocked > 0)
        };
        match deadline {
            Some(deadline) if !blocked => {
                match tokio::time::timeout_at(deadline, fut).await {
                    Ok(output) => Ok(output),
                    Err(_) => {
                        self.kill_timeout();
                        Err(TimeoutError::Expired { name })
                    }
                }
            }
            _ => Ok(fut.await),
        }
    }
}

/// Active non-cancellable scope; dropping leaves the scope.
pub struct BlockGuard {
    inner: Arc<Mutex<TimeoutState>>,
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.blocked = state.blocked.saturating_sub(1);
    }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
