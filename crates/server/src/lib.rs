// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hearth-server: the supervisor and worker halves of the pre-forked server.
//!
//! One binary, two roles. Started plain, `hearthd` becomes the supervisor:
//! it binds the listeners, creates the scoreboard and accept-mutex lock
//! file, and spawns itself once per worker slot. Started with the worker
//! environment set, it becomes a worker: it rebuilds the listener ring from
//! inherited fds, attaches the scoreboard by path, and serves connections
//! until told otherwise.

pub mod env;
pub mod lifecycle;
pub mod signal;
pub mod supervisor;
pub mod threaded;
pub mod timeout;
pub mod worker;
