// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor: spawns, counts, scales, and reaps workers.
//!
//! The control loop runs on a one-second maintenance tick. Each tick reaps
//! exited children first; only a tick with nothing to reap performs idle
//! maintenance (a burst of deaths is bounded, and replacing them is more
//! urgent than rebalancing). Signals arrive as polled events and turn into
//! generation changes at the loop boundary, never mid-tick.

mod maintenance;
mod other_child;
mod reclaim;
mod spawn;

pub use maintenance::{
    find_stuck_workers, perform_idle_maintenance, MaintenanceDecision, MaintenanceState,
    ProgressTable,
};
pub use other_child::{OtherChildCallback, OtherChildReason, OtherChildRegistry};

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::sync::Arc;

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgrp, Pid};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use hearth_core::limits::{
    GRACEFUL_SPAWN_HOLDOFF_TICKS, HARD_SERVER_LIMIT, INTERVAL_OF_WRITABLE_PROBES,
    SCOREBOARD_MAINTENANCE_INTERVAL,
};
use hearth_core::{Clock, ConfigError, Generation, ServerConfig, ServerModel, SystemClock};
use hearth_net::{
    bind_listeners, create_lock_file, remove_lock_file, BoundListeners, ListenOptions, NetError,
};
use hearth_scoreboard::{FileScoreboard, Scoreboard, ScoreboardError};

use crate::lifecycle::{LifecycleError, PidFile};
use crate::signal::{SupervisorEvent, SupervisorSignals};

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("scoreboard error: {0}")]
    Scoreboard(#[from] ScoreboardError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("failed to serialize worker config: {0}")]
    ConfigEncode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the configuration came from, so a restart can re-read it.
pub struct ConfigSources {
    pub server_root: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub pre_directives: Vec<String>,
    pub post_directives: Vec<String>,
}

impl ConfigSources {
    pub fn load(&self) -> Result<ServerConfig, ConfigError> {
        ServerConfig::load(
            self.server_root.as_deref(),
            self.config_file.as_deref(),
            &self.pre_directives,
            &self.post_directives,
        )
    }
}

struct WorkerChild {
    pid: u32,
    child: Child,
}

enum LoopExit {
    Shutdown,
    Restart,
}

pub struct Supervisor {
    config: ServerConfig,
    sources: ConfigSources,
    scoreboard: Arc<FileScoreboard>,
    listeners: Option<BoundListeners>,
    children: HashMap<usize, WorkerChild>,
    other_children: OtherChildRegistry,
    generation: Generation,
    state: MaintenanceState,
    progress: ProgressTable,
    remaining_to_start: usize,
    tick: u32,
    is_graceful: bool,
    pid_file: PidFile,
    clock: SystemClock,
    binary: PathBuf,
}

impl Supervisor {
    pub fn new(
        config: ServerConfig,
        sources: ConfigSources,
        pid_file: PidFile,
    ) -> Result<Self, SupervisorError> {
        let scoreboard = FileScoreboard::create(&config.scoreboard_path(), HARD_SERVER_LIMIT)?;
        let binary = std::env::current_exe()?;
        Ok(Self {
            config,
            sources,
            scoreboard: Arc::new(scoreboard),
            listeners: None,
            children: HashMap::new(),
            other_children: OtherChildRegistry::default(),
            generation: Generation(1),
            state: MaintenanceState::default(),
            progress: ProgressTable::default(),
            remaining_to_start: 0,
            tick: 0,
            is_graceful: false,
            pid_file,
            clock: SystemClock,
            binary,
        })
    }

    /// Track the piped error-log writer as an other-child.
    pub fn register_piped_logger(&mut self, child: Child) {
        self.other_children.register(
            "piped-log",
            child,
            Box::new(|reason, _status| match reason {
                OtherChildReason::Death | OtherChildReason::Lost => {
                    warn!("piped log writer is gone; log output may be lost");
                }
                OtherChildReason::Unwritable => {
                    warn!("piped log writer stopped reading");
                }
                OtherChildReason::Restart | OtherChildReason::Unregister => {}
            }),
        );
    }

    /// Run until final shutdown. The signal streams live outside `self` so
    /// the tick handler and the signal waiter can be selected together.
    pub async fn run(
        mut self,
        mut signals: SupervisorSignals,
    ) -> Result<(), SupervisorError> {
        loop {
            self.prepare_generation().await?;
            match self.steady_state(&mut signals).await? {
                LoopExit::Shutdown => {
                    self.shutdown(&mut signals).await;
                    return Ok(());
                }
                LoopExit::Restart => self.begin_restart(&mut signals).await?,
            }
        }
    }

    /// Restart preparation: (re)bind listeners, lock file, scoreboard,
    /// initial spawn policy.
    async fn prepare_generation(&mut self) -> Result<(), SupervisorError> {
        let addrs = self.config.listen_addrs()?;
        let options = ListenOptions {
            backlog: self.config.listen_backlog,
            send_buffer_size: self.config.send_buffer_size,
        };
        let listeners = bind_listeners(&addrs, options, self.listeners.take())?;
        listeners.clear_cloexec()?;
        self.listeners = Some(listeners);

        create_lock_file(&self.config.lock_path())?;
        if !self.is_graceful {
            self.scoreboard.reinit()?;
        }

        self.remaining_to_start =
            (self.config.start_servers as usize).min(self.config.daemons_limit());
        if self.config.server_model == ServerModel::Threaded {
            self.remaining_to_start = 1;
        }
        if self.is_graceful {
            // The old generation is still draining; spawn 1:1 as its slots
            // free up, and give the system time to recover before kicking
            // into exponential mode.
            self.state.hold_off_ticks = GRACEFUL_SPAWN_HOLDOFF_TICKS;
        } else {
            self.spawn_startup_burst().await?;
        }

        info!(
            generation = %self.generation,
            listeners = self.listeners.as_ref().map_or(0, |l| l.len()),
            "{} configured -- resuming normal operations",
            hearth_http::SERVER_STRING,
        );
        Ok(())
    }

    /// The steady-state loop: reap, spawn, maintain, until a signal asks
    /// for something else.
    async fn steady_state(
        &mut self,
        signals: &mut SupervisorSignals,
    ) -> Result<LoopExit, SupervisorError> {
        let mut ticker = tokio::time::interval(SCOREBOARD_MAINTENANCE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                event = signals.recv() => match event {
                    SupervisorEvent::Shutdown => return Ok(LoopExit::Shutdown),
                    SupervisorEvent::RestartHard => {
                        self.is_graceful = false;
                        return Ok(LoopExit::Restart);
                    }
                    SupervisorEvent::RestartGraceful => {
                        self.is_graceful = true;
                        return Ok(LoopExit::Restart);
                    }
                },
                _ = ticker.tick() => {
                    self.on_tick().await?;
                }
            }
        }
    }

    async fn on_tick(&mut self) -> Result<(), SupervisorError> {
        let reaped = self.reap_workers();
        if !reaped.is_empty() {
            // Only a finite number of children can die; replacing them is
            // this tick's job, maintenance can wait for the next one.
            self.handle_reaped(reaped).await?;
        } else if self.remaining_to_start > 0 {
            // A full tick with nothing reaped: the startup burst's
            // stragglers are done, pick up the slack.
            self.spawn_startup_burst().await?;
        } else {
            self.idle_maintenance().await?;
        }

        self.other_children.reap();
        self.tick = self.tick.wrapping_add(1);
        if self.tick % INTERVAL_OF_WRITABLE_PROBES == 0 {
            self.other_children.probe_writable_fds();
        }
        Ok(())
    }

    /// Sweep worker children for exits.
    fn reap_workers(&mut self) -> Vec<(usize, u32, Option<ExitStatus>)> {
        let mut done = Vec::new();
        for (slot, worker) in self.children.iter_mut() {
            match worker.child.try_wait() {
                Ok(Some(status)) => done.push((*slot, worker.pid, Some(status))),
                Ok(None) => {}
                Err(e) => {
                    warn!(slot, pid = worker.pid, error = %e, "cannot wait on worker");
                    done.push((*slot, worker.pid, None));
                }
            }
        }
        for (slot, _, _) in &done {
            self.children.remove(slot);
        }
        done
    }

    async fn handle_reaped(
        &mut self,
        reaped: Vec<(usize, u32, Option<ExitStatus>)>,
    ) -> Result<(), SupervisorError> {
        for (slot, pid, status) in reaped {
            let recorded = self.scoreboard.read_slot(slot)?.pid;
            if recorded != pid {
                warn!(slot, pid, recorded, "long lost child came home!");
            }
            match status {
                Some(status) if !status.success() => {
                    warn!(slot, pid, %status, "worker exited abnormally");
                }
                _ => debug!(slot, pid, "reaped worker"),
            }
            self.scoreboard.mark_dead(slot)?;

            if self.remaining_to_start > 0 && slot < self.config.daemons_limit() {
                // 1-for-1 replacement of dead children while the startup
                // burst is still owed.
                self.make_child(slot).await?;
                self.remaining_to_start -= 1;
            }
        }
        Ok(())
    }

    /// One idle-maintenance pass over the census.
    async fn idle_maintenance(&mut self) -> Result<(), SupervisorError> {
        if self.config.server_model == ServerModel::Threaded {
            // One dispatcher process; respawn it if it is gone.
            if self.children.is_empty() {
                self.make_child(0).await?;
            }
            return Ok(());
        }

        let limit = self.config.daemons_limit();
        let mut slots = Vec::with_capacity(limit);
        for i in 0..limit {
            slots.push(self.scoreboard.read_slot(i)?);
        }
        let statuses: Vec<_> = slots.iter().map(|s| s.status).collect();

        let decision = perform_idle_maintenance(
            &statuses,
            self.config.min_spare_servers as usize,
            self.config.max_spare_servers as usize,
            &mut self.state,
        );

        if let Some(slot) = decision.kill_slot {
            // SIGUSR1 retires it gracefully, in case it picked up a request
            // while we were counting.
            let pid = self.children.get(&slot).map_or(slots[slot].pid, |w| w.pid);
            if pid != 0 {
                debug!(slot, pid, "retiring surplus idle worker");
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGUSR1);
            }
        }
        if decision.report_max_clients {
            error!(
                "server reached MaxClients setting, consider raising the \
                 max_clients setting"
            );
        }
        if let Some((spawning, idle, total)) = decision.busy_burst {
            info!(
                "server seems busy, (you may need to increase start_servers or \
                 min/max_spare_servers), spawning {spawning} children, there are \
                 {idle} idle, and {total} total children"
            );
        }
        for slot in decision.spawn_slots {
            self.make_child(slot).await?;
        }

        for pid in find_stuck_workers(&slots, &mut self.progress, self.clock.epoch_ms()) {
            warn!(pid, "worker made no progress past its deadline, sending SIGALRM");
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGALRM);
        }
        Ok(())
    }

    /// Drive a pending restart, then return for the next generation.
    async fn begin_restart(
        &mut self,
        signals: &mut SupervisorSignals,
    ) -> Result<(), SupervisorError> {
        self.other_children.notify_restart();
        if self.is_graceful {
            // Bump exit_generation BEFORE signalling: a worker that misses
            // the signal still sees the bump at its next scoreboard sync.
            self.scoreboard.set_exit_generation(self.generation.as_u32())?;
            info!("SIGUSR1 received, doing graceful restart");
            self.signal_workers(Signal::SIGUSR1);
        } else {
            info!("SIGHUP received, attempting to restart");
            self.signal_workers(Signal::SIGHUP);
            self.reclaim_child_processes(false).await;
        }
        signals.drain();
        self.generation = self.generation.next();
        self.config = self.sources.load()?;
        Ok(())
    }

    async fn shutdown(&mut self, signals: &mut SupervisorSignals) {
        info!("caught SIGTERM, shutting down");
        self.signal_process_group(Signal::SIGTERM);
        signals.drain();
        self.reclaim_child_processes(true).await;
        self.pid_file.remove();
        remove_lock_file(&self.config.lock_path());
        info!("shutdown complete");
    }

    /// Signal every tracked worker pid. Restarts target workers directly:
    /// a group signal would also hit this process, and the echoed event can
    /// surface after the drain, turning one restart into a loop of them.
    fn signal_workers(&self, signal: Signal) {
        for worker in self.children.values() {
            if let Err(e) = kill(Pid::from_raw(worker.pid as i32), signal) {
                warn!(pid = worker.pid, %signal, error = %e, "kill failed");
            }
        }
    }

    /// Signal our whole process group (children included). Only used on the
    /// way out, where an echoed event can no longer change anything.
    fn signal_process_group(&self, signal: Signal) {
        if let Err(e) = killpg(getpgrp(), signal) {
            warn!(%signal, error = %e, "killpg failed");
        }
    }
}
