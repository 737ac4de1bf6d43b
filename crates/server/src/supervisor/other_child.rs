// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Children the supervisor reaps but that hold no worker slot, such as
//! piped log writers. Registrants get event callbacks; the registry owns
//! the process handles.

use std::os::fd::AsFd;
use std::process::{Child, ExitStatus};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, warn};

/// Why a registrant is being called back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtherChildReason {
    /// The child exited; carries nothing extra here, the status is logged.
    Death,
    /// The child's write fd stopped accepting data.
    Unwritable,
    /// The supervisor is restarting; the child is still alive.
    Restart,
    /// The registrant asked for removal.
    Unregister,
    /// The child cannot be waited on anymore; responsibility shifts to the
    /// registrant.
    Lost,
}

pub type OtherChildCallback = Box<dyn FnMut(OtherChildReason, Option<ExitStatus>) + Send>;

struct OtherChild {
    name: String,
    child: Child,
    on_event: OtherChildCallback,
}

/// Registry of non-worker children.
#[derive(Default)]
pub struct OtherChildRegistry {
    children: Vec<OtherChild>,
}

impl OtherChildRegistry {
    /// Track `child`. Its stdin (if piped) doubles as the probed write fd.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        child: Child,
        on_event: OtherChildCallback,
    ) {
        let name = name.into();
        debug!(name = %name, pid = child.id(), "registered other child");
        self.children.push(OtherChild { name, child, on_event });
    }

    pub fn unregister(&mut self, pid: u32) {
        if let Some(pos) = self.children.iter().position(|c| c.child.id() == pid) {
            let mut entry = self.children.swap_remove(pos);
            (entry.on_event)(OtherChildReason::Unregister, None);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Reap exited children, invoking their Death (or Lost) callbacks.
    pub fn reap(&mut self) {
        let mut finished = Vec::new();
        for (i, entry) in self.children.iter_mut().enumerate() {
            match entry.child.try_wait() {
                Ok(Some(status)) => {
                    warn!(name = %entry.name, pid = entry.child.id(), %status,
                          "other child exited");
                    (entry.on_event)(OtherChildReason::Death, Some(status));
                    finished.push(i);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(name = %entry.name, pid = entry.child.id(), error = %e,
                          "other child cannot be waited on");
                    (entry.on_event)(OtherChildReason::Lost, None);
                    finished.push(i);
                }
            }
        }
        for i in finished.into_iter().rev() {
            self.children.swap_remove(i);
        }
    }

    /// Notify live registrants that a restart is in progress.
    pub fn notify_restart(&mut self) {
        for entry in &mut self.children {
            (entry.on_event)(OtherChildReason::Restart, None);
        }
    }

    /// Zero-timeout writability probe over every piped-stdin fd. A fd that
    /// reports error/hangup (or no longer reports writable) triggers the
    /// Unwritable callback.
    pub fn probe_writable_fds(&mut self) {
        for entry in &mut self.children {
            let Some(stdin) = entry.child.stdin.as_ref() else {
                continue;
            };
            let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLOUT)];
            let unwritable = match poll(&mut fds, PollTimeout::ZERO) {
                Ok(0) => true,
                Ok(_) => {
                    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
                    revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP)
                        || !revents.contains(PollFlags::POLLOUT)
                }
                Err(_) => true,
            };
            if unwritable {
                warn!(name = %entry.name, "other child write fd no longer writable");
                (entry.on_event)(OtherChildReason::Unwritable, None);
            }
        }
    }

    /// Pids of live registered children (used by the reclaim ladder).
    pub fn live_pids(&self) -> Vec<u32> {
        self.children.iter().map(|c| c.child.id()).collect()
    }
}

#[cfg(test)]
#[path = "other_child_tests.rs"]
mod tests;
