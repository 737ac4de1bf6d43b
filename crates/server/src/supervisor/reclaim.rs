// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reclaiming children that refuse to exit.
//!
//! Escalation ladder with exponential delays between rounds: wait, then
//! another SIGHUP for stragglers that may have missed the first, then
//! SIGTERM, then SIGKILL, then give up (a survivor may make the next bind
//! fail, which is reported then).

use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{error, warn};

use hearth_scoreboard::Scoreboard;

use super::Supervisor;

const INITIAL_WAIT: Duration = Duration::from_micros(16_384);

impl Supervisor {
    /// Collect every child, escalating as needed. `terminate` skips the
    /// polite early rounds (a group SIGTERM was already sent).
    pub(crate) async fn reclaim_child_processes(&mut self, terminate: bool) {
        let mut waittime = INITIAL_WAIT;
        let first_round = if terminate { 4 } else { 1 };

        for round in first_round..=9 {
            // Let children have a few moments to exit, with exponential
            // backoff between rounds.
            tokio::time::sleep(waittime).await;
            waittime *= 4;

            for (slot, _pid, _status) in self.reap_workers() {
                let _ = self.scoreboard.mark_dead(slot);
            }

            let mut not_dead_yet = 0usize;
            let stragglers: Vec<(usize, u32)> =
                self.children.iter().map(|(slot, w)| (*slot, w.pid)).collect();
            for (slot, pid) in stragglers {
                not_dead_yet += 1;
                let target = Pid::from_raw(pid as i32);
                match round {
                    3 => {
                        // Perhaps it missed the SIGHUP; try again.
                        warn!(slot, pid, "child did not exit, sending another SIGHUP");
                        let _ = kill(target, Signal::SIGHUP);
                        waittime = INITIAL_WAIT;
                    }
                    7 => {
                        warn!(slot, pid, "child still did not exit, sending a SIGTERM");
                        let _ = kill(target, Signal::SIGTERM);
                    }
                    8 => {
                        error!(slot, pid, "child still did not exit, sending a SIGKILL");
                        let _ = kill(target, Signal::SIGKILL);
                    }
                    9 => {
                        error!(
                            slot,
                            pid,
                            "could not make child process exit, attempting to \
                             continue anyway"
                        );
                    }
                    _ => {}
                }
            }

            self.other_children.reap();
            self.other_children.notify_restart();
            not_dead_yet += self.other_children.live_pids().len();

            if not_dead_yet == 0 {
                break;
            }
        }
    }
}
