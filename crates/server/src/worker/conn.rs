// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driving one accepted connection through its keep-alive request loop.
//!
//! Slot status is published *before* every blocking phase and after it
//! completes, so the supervisor's idle count is always a conservative
//! snapshot of what this worker is doing.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hearth_core::{ServerConfig, WorkerStatus};
use hearth_http::{
    discard_body, read_request, write_response, Handler, Protocol, Response,
};
use hearth_net::lingering_close;
use hearth_scoreboard::{RequestInfo, Scoreboard, ScoreboardError};

use crate::timeout::{TimeoutError, TimeoutPlane};

use super::WorkerError;

/// Everything one worker (process or task) needs to serve connections.
pub struct WorkerContext {
    pub config: ServerConfig,
    pub slot: usize,
    pub generation: u32,
    pub scoreboard: Arc<dyn Scoreboard>,
    pub handler: Arc<dyn Handler>,
    pub timeouts: TimeoutPlane,
    /// Hard die: act at the next checkpoint.
    pub die: CancellationToken,
    /// Graceful die: act between connections, or between keep-alive
    /// requests.
    pub graceful: CancellationToken,
}

/// One accepted connection, alive from accept to close.
struct Connection {
    reader: BufReader<TcpStream>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    remote_ip: String,
    /// Set when the client is gone or a deadline fired: close hard, skip
    /// the drain.
    aborted: bool,
    /// True once at least one request completed and the connection was
    /// held open for another.
    keptalive: bool,
}

impl Connection {
    fn new(stream: TcpStream, remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "setsockopt TCP_NODELAY failed");
        }
        Self {
            reader: BufReader::new(stream),
            local_addr,
            remote_addr,
            remote_ip: remote_addr.ip().to_string(),
            aborted: false,
            keptalive: false,
        }
    }
}

/// What became of one connection.
#[derive(Debug, Default)]
pub struct ConnOutcome {
    pub requests: u32,
    /// Aborted connections were closed hard; clean ones drained first.
    pub aborted: bool,
}

/// Publish a status transition plus the currently armed deadline length.
pub(crate) fn publish_status(
    ctx: &WorkerContext,
    status: WorkerStatus,
    info: Option<&RequestInfo>,
) -> Result<(), ScoreboardError> {
    // Slot read-modify-write is not cancellable.
    let _blocked = ctx.timeouts.block();
    let mut slot = ctx.scoreboard.read_slot(ctx.slot)?;
    slot.status = status;
    slot.timeout_len = ctx.timeouts.timeout_len_secs();
    if let Some(info) = info {
        slot.set_client(&info.client);
        slot.set_request(&info.request);
    }
    if status == WorkerStatus::Ready {
        slot.conn_bytes = 0;
    }
    ctx.scoreboard.write_slot(ctx.slot, &slot)
}

/// Serve every request the connection carries, then retire it.
pub async fn serve_connection(
    ctx: &WorkerContext,
    stream: TcpStream,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
) -> Result<ConnOutcome, WorkerError> {
    let mut conn = Connection::new(stream, remote_addr, local_addr);
    let mut outcome = ConnOutcome::default();
    debug!(
        client = %conn.remote_addr,
        listener = %conn.local_addr,
        "connection open"
    );

    loop {
        // Arm the read deadline, then advertise the phase.
        if conn.keptalive {
            ctx.timeouts
                .keepalive_timeout("keep-alive read", ctx.config.keepalive_timeout());
        } else {
            ctx.timeouts.hard_timeout("read request", ctx.config.io_timeout());
        }
        let info = RequestInfo { client: conn.remote_ip.clone(), request: String::new() };
        publish_status(ctx, WorkerStatus::BusyRead, Some(&info))?;

        // While parked between keep-alive requests, a graceful event may
        // retire us; mid-read of the first request it may not.
        let read = if conn.keptalive {
            tokio::select! {
                biased;
                r = ctx.timeouts.guard_io(read_request(&mut conn.reader)) => Some(r),
                _ = ctx.graceful.cancelled() => None,
                _ = ctx.die.cancelled() => None,
            }
        } else {
            Some(ctx.timeouts.guard_io(read_request(&mut conn.reader)).await)
        };
        let Some(read) = read else {
            break;
        };

        let request = match read {
            Ok(Ok(Some(request))) => request,
            // Client closed between requests: the normal end of keep-alive.
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                if let Some(status) = e.status_code() {
                    warn!(client = %conn.remote_ip, error = %e, "rejecting bad request");
                    let response = Response::error(status);
                    let _ = write_response(
                        conn.reader.get_mut(),
                        Protocol::Http10,
                        &response,
                        false,
                    )
                    .await;
                } else {
                    debug!(client = %conn.remote_ip, error = %e, "client stopped connection");
                    conn.aborted = true;
                }
                break;
            }
            Err(TimeoutError::Expired { .. }) => {
                if conn.keptalive {
                    debug!(client = %conn.remote_ip, "keep-alive wait idled out");
                } else {
                    warn!(client = %conn.remote_ip, "request timed out");
                    conn.aborted = true;
                }
                break;
            }
            Err(TimeoutError::ExitRequested) => break,
        };
        ctx.timeouts.kill_timeout();

        let info =
            RequestInfo { client: conn.remote_ip.clone(), request: request.request_line() };
        publish_status(ctx, WorkerStatus::BusyWrite, Some(&info))?;

        let keepalive = ctx.config.keep_alive && request.wants_keepalive();
        let response = ctx.handler.handle(&request).await;

        ctx.timeouts.hard_timeout("send response", ctx.config.io_timeout());
        let written = match ctx
            .timeouts
            .guard_io(write_response(
                conn.reader.get_mut(),
                request.protocol,
                &response,
                keepalive,
            ))
            .await
        {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => {
                debug!(client = %conn.remote_ip, error = %e, "client stopped connection");
                conn.aborted = true;
                break;
            }
            Err(_) => {
                warn!(client = %conn.remote_ip, "response send timed out");
                conn.aborted = true;
                break;
            }
        };
        ctx.timeouts.kill_timeout();
        ctx.scoreboard.increment_counts(ctx.slot, written)?;
        outcome.requests += 1;

        // Reach the next message boundary before another read.
        if keepalive {
            if let Some(length) = request.content_length() {
                if length > 0 {
                    ctx.timeouts
                        .hard_timeout("read request body", ctx.config.io_timeout());
                    let drained =
                        ctx.timeouts.guard_io(discard_body(&mut conn.reader, length)).await;
                    ctx.timeouts.kill_timeout();
                    if !matches!(drained, Ok(Ok(()))) {
                        conn.aborted = true;
                        break;
                    }
                }
            }
        }

        if !keepalive {
            break;
        }

        publish_status(ctx, WorkerStatus::BusyKeepalive, None)?;

        // Retirement checkpoints between requests.
        match ctx.scoreboard.exit_generation() {
            Ok(exit_generation) if exit_generation >= ctx.generation => break,
            Ok(_) => {}
            Err(e) => return Err(WorkerError::Scoreboard(e)),
        }
        if ctx.die.is_cancelled() || ctx.graceful.is_cancelled() {
            break;
        }
        conn.keptalive = true;
    }

    ctx.timeouts.kill_timeout();
    outcome.aborted = conn.aborted;
    let stream = conn.reader.into_inner();
    if outcome.aborted {
        // Hard close; the client may see RST, which is the point.
        drop(stream);
    } else {
        lingering_close(stream).await;
    }
    Ok(outcome)
}

#[cfg(test)]
#[path = "conn_tests.rs"]
mod tests;
