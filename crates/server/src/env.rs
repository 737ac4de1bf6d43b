// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the supervisor/worker split.
//!
//! The supervisor communicates with spawned workers exclusively through the
//! environment: slot, generation, the resolved config (as JSON, so `-C`/`-c`
//! directives survive the exec), and the inherited listener fds.

use hearth_core::ServerConfig;

/// Worker slot index; presence marks the process as a worker.
pub const WORKER_SLOT: &str = "HEARTHD_WORKER_SLOT";

/// Supervisor generation the worker was born into.
pub const GENERATION: &str = "HEARTHD_GENERATION";

/// Resolved `ServerConfig`, serialized as JSON.
pub const CONFIG_JSON: &str = "HEARTHD_CONFIG_JSON";

/// Set when the worker should run the threaded dispatcher instead of the
/// prefork accept loop.
pub const THREADED: &str = "HEARTHD_THREADED";

/// Set on the re-spawned supervisor after detaching from the terminal.
pub const DETACHED: &str = "HEARTHD_DETACHED";

pub fn worker_slot() -> Option<usize> {
    std::env::var(WORKER_SLOT).ok().and_then(|s| s.parse().ok())
}

pub fn generation() -> Option<u32> {
    std::env::var(GENERATION).ok().and_then(|s| s.parse().ok())
}

pub fn worker_config() -> Option<ServerConfig> {
    let json = std::env::var(CONFIG_JSON).ok()?;
    serde_json::from_str(&json).ok()
}

pub fn listen_env() -> Option<String> {
    std::env::var(hearth_net::LISTEN_FDS_ENV).ok()
}

pub fn threaded_worker() -> bool {
    std::env::var(THREADED).is_ok_and(|v| v == "1")
}

pub fn detached() -> bool {
    std::env::var(DETACHED).is_ok_and(|v| v == "1")
}
