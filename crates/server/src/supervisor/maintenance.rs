// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle-maintenance decisions, as pure functions over a census snapshot.
//!
//! `idle_spawn_rate` is the number of children spawned on the next cycle if
//! there are not enough idle workers. It doubles up to `MAX_SPAWN_RATE` and
//! resets to 1 the first cycle that needs no spawn.

use std::collections::HashMap;

use hearth_core::limits::MAX_SPAWN_RATE;
use hearth_core::WorkerStatus;
use hearth_scoreboard::WorkerSlot;

/// Mutable control state carried across maintenance ticks.
pub struct MaintenanceState {
    pub idle_spawn_rate: usize,
    /// Ticks left before exponential spawning may resume after a graceful
    /// restart, while the old generation is still draining.
    pub hold_off_ticks: u32,
    /// "MaxClients reached" is reported only once.
    pub reported_max_clients: bool,
    /// Highest slot index ever used + 1; confines census scans.
    pub max_daemons_limit: usize,
}

impl Default for MaintenanceState {
    fn default() -> Self {
        Self {
            idle_spawn_rate: 1,
            hold_off_ticks: 0,
            reported_max_clients: false,
            max_daemons_limit: 0,
        }
    }
}

/// What one maintenance tick decided.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MaintenanceDecision {
    /// Retire this slot gracefully (idle surplus). Highest-numbered idle
    /// slot: low-numbered workers see more traffic and keep warmer caches.
    pub kill_slot: Option<usize>,
    /// Spawn into these dead slots (idle shortage), lowest numbers first.
    pub spawn_slots: Vec<usize>,
    /// Log "MaxClients reached" (first time only).
    pub report_max_clients: bool,
    /// Log a spawn burst (rate has grown to 8+): (spawning, idle, total).
    pub busy_burst: Option<(usize, usize, usize)>,
}

/// One tick of idle maintenance over the slot statuses `[0, daemons_limit)`.
pub fn perform_idle_maintenance(
    statuses: &[WorkerStatus],
    min_spare: usize,
    max_spare: usize,
    state: &mut MaintenanceState,
) -> MaintenanceDecision {
    let mut idle_count = 0usize;
    let mut to_kill = None;
    let mut free_slots = Vec::new();
    let mut last_non_dead = None;
    let mut total_non_dead = 0usize;

    for (i, status) in statuses.iter().enumerate() {
        if i >= state.max_daemons_limit && free_slots.len() == state.idle_spawn_rate {
            break;
        }
        match status {
            WorkerStatus::Starting | WorkerStatus::Ready => {
                idle_count += 1;
                to_kill = Some(i);
            }
            WorkerStatus::Dead => {
                // Keep child numbers as low as possible.
                if free_slots.len() < state.idle_spawn_rate {
                    free_slots.push(i);
                }
            }
            _ => {}
        }
        if *status != WorkerStatus::Dead {
            total_non_dead += 1;
            last_non_dead = Some(i);
        }
    }
    state.max_daemons_limit = last_non_dead.map_or(0, |i| i + 1);

    let mut decision = MaintenanceDecision::default();
    if idle_count > max_spare {
        decision.kill_slot = to_kill;
        state.idle_spawn_rate = 1;
    } else if idle_count < min_spare {
        if free_slots.is_empty() {
            if !state.reported_max_clients {
                decision.report_max_clients = true;
                state.reported_max_clients = true;
            }
            state.idle_spawn_rate = 1;
        } else {
            if state.idle_spawn_rate >= 8 {
                decision.busy_burst = Some((free_slots.len(), idle_count, total_non_dead));
            }
            decision.spawn_slots = free_slots;
            if state.hold_off_ticks > 0 {
                state.hold_off_ticks -= 1;
            } else if state.idle_spawn_rate < MAX_SPAWN_RATE {
                state.idle_spawn_rate *= 2;
            }
        }
    } else {
        state.idle_spawn_rate = 1;
    }
    decision
}

/// Supervisor-side view of each worker's request progress.
#[derive(Default)]
pub struct ProgressTable {
    entries: HashMap<usize, Progress>,
}

struct Progress {
    vtime: u32,
    since_ms: u64,
}

/// Find live workers with an armed deadline and no progress for longer than
/// that deadline. The returned pids get a SIGALRM nudge; workers install no
/// SIGALRM handler, so a wedged one dies and is respawned.
pub fn find_stuck_workers(
    slots: &[WorkerSlot],
    table: &mut ProgressTable,
    now_ms: u64,
) -> Vec<u32> {
    let mut stuck = Vec::new();
    for (i, slot) in slots.iter().enumerate() {
        if slot.status == WorkerStatus::Dead || slot.timeout_len == 0 {
            table.entries.remove(&i);
            continue;
        }
        match table.entries.get_mut(&i) {
            Some(entry) if entry.vtime == slot.cur_vtime => {
                if entry.since_ms + slot.timeout_len as u64 * 1000 < now_ms {
                    stuck.push(slot.pid);
                    // Re-arm so the same worker is not re-signalled every tick.
                    entry.since_ms = now_ms;
                }
            }
            _ => {
                table
                    .entries
                    .insert(i, Progress { vtime: slot.cur_vtime, since_ms: now_ms });
            }
        }
    }
    stuck
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
