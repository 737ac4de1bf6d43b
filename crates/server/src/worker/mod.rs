// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One worker process: accept under the mutex, serve, repeat.
//!
//! Exit discipline: every path out of the loop is a checkpoint --- a die
//! event, a graceful event observed between connections, an
//! `exit_generation` bump, the per-child request budget, or a fatal accept
//! error. Mid-connection, graceful death is deferred until the connection
//! closes.

pub mod conn;

pub use conn::{serve_connection, ConnOutcome, WorkerContext};

use std::ffi::CString;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use hearth_core::ServerConfig;
use hearth_http::DefaultHandler;
use hearth_net::{
    accept_error_is_transient, acquire, attach_mutex, AcceptMutex, ListenerRing, NetError,
};
use hearth_scoreboard::{FileScoreboard, Scoreboard, ScoreboardError};

use crate::signal::WorkerSignals;
use crate::timeout::TimeoutPlane;

/// Worker errors
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("scoreboard error: {0}")]
    Scoreboard(#[from] ScoreboardError),

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("bad worker environment: {0}")]
    BadEnvironment(&'static str),

    #[error("cannot drop privileges: {0}")]
    PrivilegeDrop(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry point for a spawned prefork worker. Returns the process exit code.
pub async fn worker_main(config: ServerConfig, slot: usize, generation: u32) -> i32 {
    match init_worker(config, slot, generation).await {
        Ok(code) => code,
        Err(e) => {
            error!(slot, error = %e, "worker initialization failed");
            1
        }
    }
}

async fn init_worker(
    config: ServerConfig,
    slot: usize,
    generation: u32,
) -> Result<i32, WorkerError> {
    let timeouts = TimeoutPlane::new();
    let signals = WorkerSignals::install(timeouts.clone())?;

    // Critical init section: a die event arriving while we attach shared
    // state must not unwind us mid-attach; it is deferred until the guard
    // drops and acted on at the checkpoint below.
    let (ring, mutex, scoreboard) = {
        let _blocked = timeouts.block();

        // Crash artifacts land where the config says.
        if let Err(e) = std::env::set_current_dir(config.coredump_path()) {
            debug!(error = %e, "could not chdir to coredump dir");
        }

        // Reopen the census in this address space.
        if !FileScoreboard::exists(&config.scoreboard_path()) {
            return Err(WorkerError::BadEnvironment("no scoreboard image"));
        }
        let scoreboard: Arc<dyn Scoreboard> =
            Arc::new(FileScoreboard::open(&config.scoreboard_path())?);

        let listen = crate::env::listen_env()
            .ok_or(WorkerError::BadEnvironment("no inherited listeners"))?;
        let mut ring = ListenerRing::from_env(&listen)?;
        // Each newly born worker starts the ring at a different listener.
        ring.seed_cursor(slot);

        // With one listener the kernel serializes accept for us; with more,
        // the cross-process mutex is mandatory.
        let mutex = if ring.len() > 1 {
            Some(attach_mutex(config.accept_mutex, &config.lock_path())?)
        } else {
            None
        };

        drop_privileges(&config)?;
        (ring, mutex, scoreboard)
    };
    if timeouts.check().is_err() {
        // Told to die while the init scope was blocked.
        return Ok(0);
    }

    let handler: Arc<dyn hearth_http::Handler> = Arc::new(DefaultHandler);
    let ctx = WorkerContext {
        config,
        slot,
        generation,
        scoreboard,
        handler,
        timeouts,
        die: signals.die_token(),
        graceful: signals.graceful_token(),
    };
    info!(slot, generation, "worker ready");
    Ok(child_main(ring, mutex, ctx).await)
}

/// The per-connection loop.
pub async fn child_main(
    mut ring: ListenerRing,
    mutex: Option<Arc<dyn AcceptMutex>>,
    ctx: WorkerContext,
) -> i32 {
    let mut requests_this_child: u32 = 0;

    loop {
        // (Re)initialize to a pre-connection state.
        ctx.timeouts.kill_timeout();

        // Between connections is the right time to exit, for any reason ---
        // including a die that was deferred past a blocked scope.
        if ctx.timeouts.check().is_err() {
            return 0;
        }
        if ctx.die.is_cancelled() || ctx.graceful.is_cancelled() {
            return 0;
        }
        match ctx.scoreboard.exit_generation() {
            Ok(exit_generation) if exit_generation >= ctx.generation => return 0,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "lost the scoreboard");
                return 1;
            }
        }
        if ctx.config.max_requests_per_child > 0
            && requests_this_child >= ctx.config.max_requests_per_child
        {
            debug!(slot = ctx.slot, "request budget spent, retiring");
            return 0;
        }
        if let Err(e) = conn::publish_status(&ctx, hearth_core::WorkerStatus::Ready, None) {
            error!(error = %e, "cannot update scoreboard slot");
            return 1;
        }

        // Serialize entry into accept across the worker pool.
        let locked = match &mutex {
            Some(mutex) => {
                let held = tokio::select! {
                    biased;
                    r = acquire(Arc::clone(mutex)) => match r {
                        Ok(()) => true,
                        Err(e) => {
                            error!(error = %e, "accept mutex lock failed");
                            return 1;
                        }
                    },
                    _ = ctx.die.cancelled() => return 0,
                    _ = ctx.graceful.cancelled() => return 0,
                };
                held
            }
            None => false,
        };

        // A die-event during the wait must not strand the lock: unlock
        // first, act after. A graceful event racing a successful accept
        // loses --- the accepted connection is served before retirement.
        let accepted = tokio::select! {
            biased;
            r = ring.accept_next() => Some(r),
            _ = ctx.die.cancelled() => None,
            _ = ctx.graceful.cancelled() => None,
        };
        if locked {
            if let Some(mutex) = &mutex {
                if let Err(e) = mutex.unlock() {
                    error!(error = %e, "accept mutex unlock failed");
                    return 1;
                }
            }
        }
        let Some(result) = accepted else {
            // Told to die while waiting; no socket in hand.
            return 0;
        };

        let (stream, peer, local) = match result {
            Ok(accepted) => accepted,
            Err(e) if accept_error_is_transient(&e) => {
                debug!(error = %e, "transient accept error, retrying");
                continue;
            }
            Err(e) => {
                // EMFILE loops and kernel oddities: continuing is dangerous.
                error!(error = %e, "accept failed, worker exiting");
                return 1;
            }
        };

        match serve_connection(&ctx, stream, peer, local).await {
            Ok(_outcome) => {
                requests_this_child = requests_this_child.saturating_add(1);
            }
            Err(e) => {
                error!(error = %e, "connection handling failed fatally");
                return 1;
            }
        }
    }
}

/// Give up root for the configured user/group. Failing to do so while
/// running as the superuser is fatal.
fn drop_privileges(config: &ServerConfig) -> Result<(), WorkerError> {
    use nix::unistd::{initgroups, setgid, setuid, Group, Uid, User};

    if !Uid::effective().is_root() {
        return Ok(());
    }
    let Some(name) = config.user.as_deref() else {
        warn!("running as root with no user configured; privileges retained");
        return Ok(());
    };

    let user = User::from_name(name)
        .map_err(|e| WorkerError::PrivilegeDrop(format!("lookup {name}: {e}")))?
        .ok_or_else(|| WorkerError::PrivilegeDrop(format!("unknown user {name}")))?;
    let gid = match config.group.as_deref() {
        Some(group) => Group::from_name(group)
            .map_err(|e| WorkerError::PrivilegeDrop(format!("lookup group {group}: {e}")))?
            .ok_or_else(|| WorkerError::PrivilegeDrop(format!("unknown group {group}")))?
            .gid,
        None => user.gid,
    };

    setgid(gid).map_err(|e| WorkerError::PrivilegeDrop(format!("setgid {gid}: {e}")))?;
    let cname = CString::new(name)
        .map_err(|_| WorkerError::PrivilegeDrop(format!("bad user name {name:?}")))?;
    initgroups(&cname, gid)
        .map_err(|e| WorkerError::PrivilegeDrop(format!("initgroups: {e}")))?;
    setuid(user.uid).map_err(|e| WorkerError::PrivilegeDrop(format!("setuid: {e}")))?;
    Ok(())
}
