// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker spawning.
//!
//! Workers are the supervisor's own binary re-executed with the worker
//! environment: slot, generation, resolved config, inherited listener fds.

use std::process::{Command, Stdio};

use tracing::{debug, error};

use hearth_core::limits::SPAWN_FAILURE_HOLDOFF;
use hearth_core::{ServerModel, WorkerStatus};
use hearth_scoreboard::Scoreboard;

use super::{Supervisor, SupervisorError, WorkerChild};
use crate::env;

impl Supervisor {
    /// Spawn a worker into `slot`. Returns false (after a hold-off sleep)
    /// when the spawn itself failed, so a resource-exhaustion storm cannot
    /// turn into a spawn storm.
    pub(crate) async fn make_child(&mut self, slot: usize) -> Result<bool, SupervisorError> {
        if slot + 1 > self.state.max_daemons_limit {
            self.state.max_daemons_limit = slot + 1;
        }
        self.scoreboard.update_child_status(slot, WorkerStatus::Starting, None)?;

        let listeners = self
            .listeners
            .as_ref()
            .ok_or_else(|| std::io::Error::other("listeners not bound"))?;

        let mut command = Command::new(&self.binary);
        command
            .env(env::WORKER_SLOT, slot.to_string())
            .env(env::GENERATION, self.generation.as_u32().to_string())
            .env(env::CONFIG_JSON, serde_json::to_string(&self.config)?)
            .env(hearth_net::LISTEN_FDS_ENV, listeners.listen_env())
            .stdin(Stdio::null());
        if self.config.server_model == ServerModel::Threaded {
            command.env(env::THREADED, "1");
        }

        match command.spawn() {
            Ok(child) => {
                let pid = child.id();
                self.scoreboard.mark_starting(slot, pid, self.generation.as_u32())?;
                debug!(slot, pid, generation = %self.generation, "started worker");
                self.children.insert(slot, WorkerChild { pid, child });
                Ok(true)
            }
            Err(e) => {
                error!(slot, error = %e, "unable to spawn new worker process");
                self.scoreboard.mark_dead(slot)?;
                tokio::time::sleep(SPAWN_FAILURE_HOLDOFF).await;
                Ok(false)
            }
        }
    }

    /// Spawn the owed startup burst into dead slots, lowest numbers first.
    pub(crate) async fn spawn_startup_burst(&mut self) -> Result<(), SupervisorError> {
        let limit = self.config.daemons_limit();
        let mut slot = 0;
        while self.remaining_to_start > 0 && slot < limit {
            let free = !self.children.contains_key(&slot)
                && self.scoreboard.read_slot(slot)?.status == WorkerStatus::Dead;
            if free {
                self.make_child(slot).await?;
                self.remaining_to_start -= 1;
            }
            slot += 1;
        }
        self.remaining_to_start = 0;
        Ok(())
    }
}
