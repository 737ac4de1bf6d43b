// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker slot status and supervisor generation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of one worker slot, as published in the scoreboard.
///
/// The owning worker writes every transition except `Dead`, which the
/// supervisor writes after reaping, and `Starting`, which it writes just
/// before spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Slot is unused; `pid` is meaningless.
    Dead,
    /// Spawned but not yet through worker init.
    Starting,
    /// Between connections, waiting to accept.
    Ready,
    /// Reading a request from the client.
    BusyRead,
    /// Processing a request / writing the response.
    BusyWrite,
    /// Holding a keep-alive connection, waiting for the next request.
    BusyKeepalive,
    /// Finishing its last connection after a graceful-restart event.
    Graceful,
}

impl WorkerStatus {
    /// Wire value used by the fixed-width scoreboard record.
    pub fn as_u32(self) -> u32 {
        match self {
            WorkerStatus::Dead => 0,
            WorkerStatus::Starting => 1,
            WorkerStatus::Ready => 2,
            WorkerStatus::BusyRead => 3,
            WorkerStatus::BusyWrite => 4,
            WorkerStatus::BusyKeepalive => 5,
            WorkerStatus::Graceful => 6,
        }
    }

    /// Decode a wire value; unknown values decode as `Dead` so a damaged
    /// slot reads as reclaimable rather than live.
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => WorkerStatus::Starting,
            2 => WorkerStatus::Ready,
            3 => WorkerStatus::BusyRead,
            4 => WorkerStatus::BusyWrite,
            5 => WorkerStatus::BusyKeepalive,
            6 => WorkerStatus::Graceful,
            _ => WorkerStatus::Dead,
        }
    }

    /// Idle for the purposes of the supervisor's spare-worker accounting.
    ///
    /// A starting worker counts as idle: it was spawned at least a tick ago,
    /// and spawning more on top of a slow start only makes the swamp worse.
    pub fn is_idle(self) -> bool {
        matches!(self, WorkerStatus::Starting | WorkerStatus::Ready)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Dead => "dead",
            WorkerStatus::Starting => "starting",
            WorkerStatus::Ready => "ready",
            WorkerStatus::BusyRead => "busy-read",
            WorkerStatus::BusyWrite => "busy-write",
            WorkerStatus::BusyKeepalive => "keepalive",
            WorkerStatus::Graceful => "graceful",
        };
        write!(f, "{}", s)
    }
}

/// Supervisor epoch, bumped on every restart.
///
/// Workers born in generation `g` compare `g` against the scoreboard's
/// `exit_generation` to detect graceful retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u32);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
