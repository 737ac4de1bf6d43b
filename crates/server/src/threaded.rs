// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Threaded variant: one process, a bounded job queue, and a pool of
//! worker tasks.
//!
//! For platforms where the prefork model is unusable, and for the
//! one-process debug mode. A single listener task runs the ring accept
//! loop and pushes accepted sockets onto a bounded queue; worker tasks
//! each run the per-connection loop minus the accept step. Graceful death
//! stops the listener first and lets the workers drain the queue;
//! hard death stops everything at the next checkpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use hearth_core::ServerConfig;
use hearth_http::{DefaultHandler, Handler};
use hearth_net::{accept_error_is_transient, ListenerRing};
use hearth_scoreboard::{MemScoreboard, Scoreboard};

use crate::signal::WorkerSignals;
use crate::timeout::TimeoutPlane;
use crate::worker::{serve_connection, WorkerContext};

/// Entry for the threaded-model worker process spawned by the supervisor.
pub async fn threaded_worker_main(config: ServerConfig, generation: u32) -> i32 {
    if let Err(e) = std::env::set_current_dir(config.coredump_path()) {
        debug!(error = %e, "could not chdir to coredump dir");
    }
    let Some(listen) = crate::env::listen_env() else {
        error!("no inherited listeners in worker environment");
        return 1;
    };
    let ring = match ListenerRing::from_env(&listen) {
        Ok(ring) => ring,
        Err(e) => {
            error!(error = %e, "cannot rebuild listener ring");
            return 1;
        }
    };
    // Process-level plane: die events landing inside a blocked scope are
    // deferred through it. Worker tasks carry their own planes.
    let signals = match WorkerSignals::install(TimeoutPlane::new()) {
        Ok(signals) => signals,
        Err(e) => {
            error!(error = %e, "cannot install signal handling");
            return 1;
        }
    };
    let scoreboard: Arc<dyn Scoreboard> =
        Arc::new(MemScoreboard::new(config.threaded_workers as usize));
    run_dispatcher(
        config,
        ring,
        scoreboard,
        Arc::new(DefaultHandler),
        generation,
        signals.die_token(),
        signals.graceful_token(),
    )
    .await
}

/// Run the dispatcher until a die event (or, gracefully, until the queue
/// drains after a graceful event). Returns the process exit code.
pub async fn run_dispatcher(
    config: ServerConfig,
    ring: ListenerRing,
    scoreboard: Arc<dyn Scoreboard>,
    handler: Arc<dyn Handler>,
    generation: u32,
    die: CancellationToken,
    graceful: CancellationToken,
) -> i32 {
    let pool_size = (config.threaded_workers as usize).min(scoreboard.slot_count());
    let (queue_tx, queue_rx) = mpsc::channel::<(TcpStream, SocketAddr, SocketAddr)>(
        config.queue_depth as usize,
    );
    let queue_rx = Arc::new(Mutex::new(queue_rx));

    let listener = tokio::spawn(listen_loop(ring, queue_tx, die.clone(), graceful.clone()));

    let mut workers = Vec::with_capacity(pool_size);
    for slot in 0..pool_size {
        let ctx = WorkerContext {
            config: config.clone(),
            slot,
            generation,
            scoreboard: Arc::clone(&scoreboard),
            handler: Arc::clone(&handler),
            timeouts: TimeoutPlane::new(),
            die: die.clone(),
            graceful: graceful.clone(),
        };
        let queue = Arc::clone(&queue_rx);
        workers.push(tokio::spawn(worker_loop(ctx, queue)));
    }

    info!(workers = pool_size, "threaded dispatcher running");
    let _ = listener.await;
    for worker in workers {
        let _ = worker.await;
    }
    0
}

/// Accept in ring order and feed the queue until told to stop.
async fn listen_loop(
    mut ring: ListenerRing,
    queue: mpsc::Sender<(TcpStream, SocketAddr, SocketAddr)>,
    die: CancellationToken,
    graceful: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            r = ring.accept_next() => r,
            _ = die.cancelled() => break,
            _ = graceful.cancelled() => break,
        };
        match accepted {
            Ok((stream, peer, local)) => {
                if queue.send((stream, peer, local)).await.is_err() {
                    break;
                }
            }
            Err(e) if accept_error_is_transient(&e) => {
                debug!(error = %e, "transient accept error, retrying");
            }
            Err(e) => {
                error!(error = %e, "accept failed, stopping listener");
                break;
            }
        }
    }
    // Dropping the sender lets workers drain what's queued, then stop.
}

/// Dequeue one socket at a time and run the per-connection loop on it.
async fn worker_loop(
    ctx: WorkerContext,
    queue: Arc<Mutex<mpsc::Receiver<(TcpStream, SocketAddr, SocketAddr)>>>,
) {
    loop {
        if ctx.die.is_cancelled() {
            break;
        }
        let _ = ctx.scoreboard.update_child_status(
            ctx.slot,
            hearth_core::WorkerStatus::Ready,
            None,
        );
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                conn = queue.recv() => conn,
                _ = ctx.die.cancelled() => None,
            }
        };
        let Some((stream, peer, local)) = next else {
            break;
        };
        if let Err(e) = serve_connection(&ctx, stream, peer, local).await {
            error!(slot = ctx.slot, error = %e, "connection handling failed");
            break;
        }
    }
    let _ = ctx.scoreboard.mark_dead(ctx.slot);
}

#[cfg(test)]
#[path = "threaded_tests.rs"]
mod tests;
