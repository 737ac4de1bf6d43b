// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compile-time server limits.

use std::time::Duration;

/// Maximum number of worker slots the scoreboard can ever hold.
///
/// `max_clients` is clamped to this at config load; raising it requires a
/// rebuild, matching the fixed-size census the supervisor scans.
pub const HARD_SERVER_LIMIT: usize = 256;

/// Supervisor maintenance tick: reap children, then adjust the idle pool.
pub const SCOREBOARD_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Cap on the exponential idle-spawn backoff.
pub const MAX_SPAWN_RATE: usize = 32;

/// Probe registered other-children write fds every this many maintenance ticks.
pub const INTERVAL_OF_WRITABLE_PROBES: u32 = 10;

/// Upper bound on the lingering-close drain, per connection.
pub const MAX_SECS_TO_LINGER: Duration = Duration::from_secs(30);

/// Idle window inside the lingering-close drain loop.
pub const SECS_TO_LINGER_WINDOW: Duration = Duration::from_secs(2);

/// Back-off after a failed worker spawn, to avoid spawn storms under
/// resource exhaustion.
pub const SPAWN_FAILURE_HOLDOFF: Duration = Duration::from_secs(10);

/// Maintenance ticks to hold off exponential spawning after a graceful
/// restart, while old-generation workers drain.
pub const GRACEFUL_SPAWN_HOLDOFF_TICKS: u32 = 10;

/// Longest tolerated request line or header line, in bytes.
pub const MAX_LINE_LENGTH: usize = 8190;

/// Maximum number of request header fields.
pub const MAX_HEADER_COUNT: usize = 100;
