// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener inheritance across the supervisor→worker exec boundary.
//!
//! The supervisor clears `FD_CLOEXEC` on its bound listeners and advertises
//! them as `HEARTHD_LISTEN_FDS=<fd>=<addr>,...`; a worker parses the value
//! and reconstructs owned sockets. Reconstruction is the workspace's one
//! `unsafe` site: the raw fds are promoted to `OwnedFd`s exactly once, in
//! the process that inherited them.

use std::net::SocketAddr;
use std::os::fd::RawFd;

use crate::error::NetError;

/// Environment variable naming the inherited listener fds.
pub const LISTEN_FDS_ENV: &str = "HEARTHD_LISTEN_FDS";

/// Serialize `(fd, addr)` pairs for the worker environment.
pub fn format_listen_env(pairs: impl Iterator<Item = (RawFd, SocketAddr)>) -> String {
    pairs
        .map(|(fd, addr)| format!("{}={}", fd, addr))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the advertised `(fd, addr)` pairs.
pub fn parse_listen_env(value: &str) -> Result<Vec<(RawFd, SocketAddr)>, NetError> {
    let mut pairs = Vec::new();
    for part in value.split(',').filter(|p| !p.is_empty()) {
        let (fd, addr) = part
            .split_once('=')
            .ok_or_else(|| NetError::BadListenEnv(value.to_string()))?;
        let fd: RawFd =
            fd.parse().map_err(|_| NetError::BadListenEnv(value.to_string()))?;
        let addr: SocketAddr =
            addr.parse().map_err(|_| NetError::BadListenEnv(value.to_string()))?;
        pairs.push((fd, addr));
    }
    if pairs.is_empty() {
        return Err(NetError::BadListenEnv(value.to_string()));
    }
    Ok(pairs)
}

/// Rebuild std listeners from the advertised environment value.
pub fn rebuild_listeners(
    value: &str,
) -> Result<Vec<(std::net::TcpListener, SocketAddr)>, NetError> {
    parse_listen_env(value)?
        .into_iter()
        .map(|(fd, addr)| Ok((owned::take_listener(fd), addr)))
        .collect()
}

#[allow(unsafe_code)]
mod owned {
    use std::os::fd::{FromRawFd, OwnedFd, RawFd};

    /// Promote an inherited raw fd to an owned listener.
    ///
    /// SAFETY: the fd number comes from the supervisor's `HEARTHD_LISTEN_FDS`
    /// advertisement, refers to a listening socket the worker inherited at
    /// exec, and is claimed exactly once per process (the env value is read
    /// a single time during worker init), so ownership is unique.
    pub(super) fn take_listener(fd: RawFd) -> std::net::TcpListener {
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        std::net::TcpListener::from(owned)
    }
}

#[cfg(test)]
#[path = "inherit_tests.rs"]
mod tests;
