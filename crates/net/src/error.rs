// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Networking errors.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("socket option on {addr}: {source}")]
    SockOpt {
        addr: SocketAddr,
        #[source]
        source: nix::Error,
    },

    #[error("lock file {path}: {source}")]
    LockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("accept mutex: {0}")]
    Mutex(#[source] std::io::Error),

    #[error("bad listener environment: {0}")]
    BadListenEnv(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<nix::Error> for NetError {
    fn from(e: nix::Error) -> Self {
        NetError::Io(std::io::Error::from(e))
    }
}
