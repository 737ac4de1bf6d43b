// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hearth-scoreboard: the shared worker census.
//!
//! A scoreboard is a fixed array of per-worker slots plus one global
//! `exit_generation` counter. Every worker publishes its lifecycle phase and
//! request counters into its own slot; the supervisor reads all slots to
//! drive idle maintenance, and writes a slot only to mark it `Starting`
//! (just before spawn) or `Dead` (after reaping the pid).
//!
//! Two backends satisfy the same trait: a regular file addressed per slot
//! with positioned reads/writes (the multi-process production backend, since
//! workers are spawned processes and need a path-addressable census), and a
//! heap image for the threaded and one-process models.

mod file;
mod mem;
mod slot;

use thiserror::Error;

pub use file::FileScoreboard;
pub use mem::MemScoreboard;
pub use slot::{RequestInfo, WorkerSlot, SLOT_LEN};

use hearth_core::WorkerStatus;

/// Scoreboard errors
#[derive(Debug, Error)]
pub enum ScoreboardError {
    #[error("scoreboard I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a scoreboard file: {0}")]
    BadMagic(std::path::PathBuf),

    #[error("slot {slot} out of range (scoreboard holds {count})")]
    SlotOutOfRange { slot: usize, count: usize },
}

/// The census contract shared by all backends.
///
/// Single-writer-per-slot: callers must ensure at most one process holds
/// write intent on a slot at any instant. Under that rule the positioned
/// whole-slot writes of the file backend never produce a torn read of the
/// fields the supervisor consults.
pub trait Scoreboard: Send + Sync {
    fn slot_count(&self) -> usize;

    fn read_slot(&self, slot: usize) -> Result<WorkerSlot, ScoreboardError>;

    fn write_slot(&self, slot: usize, record: &WorkerSlot) -> Result<(), ScoreboardError>;

    /// Generation at or before which workers should retire after their
    /// current connection.
    fn exit_generation(&self) -> Result<u32, ScoreboardError>;

    fn set_exit_generation(&self, generation: u32) -> Result<(), ScoreboardError>;

    /// Zero every slot, preserving `exit_generation` so in-flight
    /// old-generation workers still observe a pending graceful retire.
    fn reinit(&self) -> Result<(), ScoreboardError>;

    /// Overwrite one slot's status (and optional request display fields),
    /// returning the prior status.
    fn update_child_status(
        &self,
        slot: usize,
        status: WorkerStatus,
        info: Option<&RequestInfo>,
    ) -> Result<WorkerStatus, ScoreboardError> {
        let mut record = self.read_slot(slot)?;
        let prior = record.status;
        record.status = status;
        if let Some(info) = info {
            record.set_client(&info.client);
            record.set_request(&info.request);
        }
        self.write_slot(slot, &record)?;
        Ok(prior)
    }

    /// Linear pid scan over `[0, scan_limit)`.
    fn find_child_by_pid(
        &self,
        pid: u32,
        scan_limit: usize,
    ) -> Result<Option<usize>, ScoreboardError> {
        let limit = scan_limit.min(self.slot_count());
        for slot in 0..limit {
            if self.read_slot(slot)?.pid == pid {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Supervisor-side: claim a slot for a child about to be spawned.
    fn mark_starting(
        &self,
        slot: usize,
        pid: u32,
        generation: u32,
    ) -> Result<(), ScoreboardError> {
        let mut record = self.read_slot(slot)?;
        record.status = WorkerStatus::Starting;
        record.pid = pid;
        record.generation = generation;
        self.write_slot(slot, &record)
    }

    /// Supervisor-side: release a slot whose pid has been reaped.
    fn mark_dead(&self, slot: usize) -> Result<(), ScoreboardError> {
        let mut record = self.read_slot(slot)?;
        record.status = WorkerStatus::Dead;
        record.pid = 0;
        self.write_slot(slot, &record)
    }

    /// Worker-side: fold one finished request into the lifetime counters.
    fn increment_counts(&self, slot: usize, bytes: u64) -> Result<(), ScoreboardError> {
        let mut record = self.read_slot(slot)?;
        record.access_count = record.access_count.wrapping_add(1);
        record.bytes_served = record.bytes_served.wrapping_add(bytes);
        record.conn_bytes = record.conn_bytes.wrapping_add(bytes);
        record.cur_vtime = record.cur_vtime.wrapping_add(1);
        self.write_slot(slot, &record)
    }
}
