// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hearth-core: shared types for the hearth pre-forked HTTP server.

pub mod clock;
pub mod config;
pub mod limits;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AcceptMutexKind, ConfigError, ServerConfig, ServerModel};
pub use limits::{
    HARD_SERVER_LIMIT, INTERVAL_OF_WRITABLE_PROBES, MAX_SECS_TO_LINGER, MAX_SPAWN_RATE,
    SCOREBOARD_MAINTENANCE_INTERVAL,
};
pub use status::{Generation, WorkerStatus};
