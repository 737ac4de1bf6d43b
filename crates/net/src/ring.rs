// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listening sockets: supervisor-side binding and the worker-side ring.
//!
//! The supervisor binds every configured address once and keeps the set
//! alive across graceful restarts (sockets are matched by address and
//! reused, so rebinding can never fail mid-restart). Workers traverse the
//! set as a ring with a rotating cursor: each successful accept advances the
//! cursor one past the accepting listener, so no listener is starved while
//! another stays continuously ready.

use std::future::poll_fn;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::task::Poll;

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::libc;
use nix::sys::socket::{
    bind, listen, setsockopt, socket, sockopt, AddressFamily, Backlog, SockFlag, SockType,
    SockaddrIn, SockaddrIn6,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::NetError;
use crate::inherit;

/// One bound listening socket, supervisor side.
pub struct BoundListener {
    /// Configured address (reuse key across restarts).
    pub addr: SocketAddr,
    listener: std::net::TcpListener,
}

/// The supervisor's listener set.
pub struct BoundListeners {
    entries: Vec<BoundListener>,
}

/// Socket-creation knobs taken from the server config.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenOptions {
    pub backlog: i32,
    pub send_buffer_size: Option<usize>,
}

/// Bind every configured address, reusing a matching old listener where one
/// exists. Old listeners not claimed by any address are closed.
pub fn bind_listeners(
    addrs: &[SocketAddr],
    options: ListenOptions,
    old: Option<BoundListeners>,
) -> Result<BoundListeners, NetError> {
    let mut old_entries = old.map(|o| o.entries).unwrap_or_default();
    let mut entries = Vec::with_capacity(addrs.len());

    for addr in addrs {
        if let Some(pos) = old_entries.iter().position(|e| e.addr == *addr) {
            debug!(addr = %addr, "reusing listener across restart");
            entries.push(old_entries.swap_remove(pos));
            continue;
        }
        let listener = open_listener(*addr, options)?;
        // Record the actual local address (resolves wildcard-port binds) so
        // restart-time reuse matches what the kernel bound.
        let local = listener.local_addr().unwrap_or(*addr);
        entries.push(BoundListener { addr: local, listener });
        info!(addr = %local, "listener bound");
    }

    for unused in &old_entries {
        info!(addr = %unused.addr, "closing listener no longer configured");
    }
    drop(old_entries);

    Ok(BoundListeners { entries })
}

fn open_listener(
    addr: SocketAddr,
    options: ListenOptions,
) -> Result<std::net::TcpListener, NetError> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let fd = socket(family, SockType::Stream, SockFlag::empty(), None)
        .map_err(|e| NetError::SockOpt { addr, source: e })?;

    setsockopt(&fd, sockopt::ReuseAddr, &true)
        .map_err(|e| NetError::SockOpt { addr, source: e })?;
    setsockopt(&fd, sockopt::KeepAlive, &true)
        .map_err(|e| NetError::SockOpt { addr, source: e })?;
    if let Some(size) = options.send_buffer_size {
        setsockopt(&fd, sockopt::SndBuf, &size)
            .map_err(|e| NetError::SockOpt { addr, source: e })?;
    }

    match addr {
        SocketAddr::V4(v4) => bind(fd.as_raw_fd(), &SockaddrIn::from(v4)),
        SocketAddr::V6(v6) => bind(fd.as_raw_fd(), &SockaddrIn6::from(v6)),
    }
    .map_err(|e| NetError::Bind { addr, source: std::io::Error::from(e) })?;

    let backlog = Backlog::new(options.backlog.max(1))
        .map_err(|e| NetError::SockOpt { addr, source: e })?;
    listen(&fd, backlog).map_err(|e| NetError::Bind { addr, source: std::io::Error::from(e) })?;

    Ok(std::net::TcpListener::from(fd))
}

impl BoundListeners {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Actual bound addresses (resolves port 0 binds).
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.entries
            .iter()
            .map(|e| e.listener.local_addr().unwrap_or(e.addr))
            .collect()
    }

    /// Let the fds survive exec into a worker.
    pub fn clear_cloexec(&self) -> Result<(), NetError> {
        for entry in &self.entries {
            fcntl(entry.listener.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::empty()))?;
        }
        Ok(())
    }

    /// Environment value advertising the fds to spawned workers.
    pub fn listen_env(&self) -> String {
        inherit::format_listen_env(
            self.entries.iter().map(|e| {
                let addr = e.listener.local_addr().unwrap_or(e.addr);
                (e.listener.as_raw_fd(), addr)
            }),
        )
    }

    /// Consume the set for in-process serving (one-process and threaded
    /// models, where no exec boundary is crossed).
    pub fn into_parts(self) -> Vec<(std::net::TcpListener, SocketAddr)> {
        self.entries
            .into_iter()
            .map(|e| {
                let addr = e.listener.local_addr().unwrap_or(e.addr);
                (e.listener, addr)
            })
            .collect()
    }
}

/// Worker-side ring of listeners with a rotating cursor.
pub struct ListenerRing {
    entries: Vec<RingEntry>,
    cursor: usize,
}

struct RingEntry {
    addr: SocketAddr,
    listener: TcpListener,
}

impl ListenerRing {
    /// Build the ring from already-bound std listeners.
    pub fn from_std(
        listeners: Vec<(std::net::TcpListener, SocketAddr)>,
    ) -> Result<Self, NetError> {
        let mut entries = Vec::with_capacity(listeners.len());
        for (listener, addr) in listeners {
            listener.set_nonblocking(true)?;
            entries.push(RingEntry { addr, listener: TcpListener::from_std(listener)? });
        }
        Ok(Self { entries, cursor: 0 })
    }

    /// Rebuild the ring from the environment advertised by the supervisor.
    pub fn from_env(value: &str) -> Result<Self, NetError> {
        Self::from_std(inherit::rebuild_listeners(value)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the cursor at a per-worker offset so newly born workers do not
    /// all favor the first listener.
    pub fn seed_cursor(&mut self, seed: usize) {
        if !self.entries.is_empty() {
            self.cursor = seed % self.entries.len();
        }
    }

    /// Accept the next connection in ring order.
    ///
    /// Polls listeners starting at the cursor; the first ready listener
    /// wins and the cursor advances one past it. With a single listener this
    /// degenerates to a plain accept with no scan.
    pub async fn accept_next(
        &mut self,
    ) -> Result<(TcpStream, SocketAddr, SocketAddr), std::io::Error> {
        if self.entries.len() == 1 {
            let entry = &self.entries[0];
            let (stream, peer) = entry.listener.accept().await?;
            return Ok((stream, peer, entry.addr));
        }

        let count = self.entries.len();
        if count == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no listeners in ring",
            ));
        }
        poll_fn(|cx| {
            for step in 0..count {
                let idx = (self.cursor + step) % count;
                match self.entries[idx].listener.poll_accept(cx) {
                    Poll::Ready(Ok((stream, peer))) => {
                        let local = self.entries[idx].addr;
                        self.cursor = (idx + 1) % count;
                        return Poll::Ready(Ok((stream, peer, local)));
                    }
                    Poll::Ready(Err(e)) => {
                        self.cursor = (idx + 1) % count;
                        return Poll::Ready(Err(e));
                    }
                    Poll::Pending => {}
                }
            }
            Poll::Pending
        })
        .await
    }
}

/// Accept errors worth retrying: the client vanished between the kernel's
/// handshake and our accept. Anything else (EMFILE, kernel weirdness) is
/// fatal for the worker; continuing risks a hot loop.
pub fn accept_error_is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(
            libc::EINTR
                | libc::ECONNABORTED
                | libc::ECONNRESET
                | libc::ETIMEDOUT
                | libc::EHOSTUNREACH
                | libc::ENETUNREACH
                | libc::EPROTO
        )
    )
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
