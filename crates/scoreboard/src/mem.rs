// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heap scoreboard for the threaded and one-process models, where all
//! workers share one address space.

use parking_lot::Mutex;

use crate::slot::WorkerSlot;
use crate::{Scoreboard, ScoreboardError};

pub struct MemScoreboard {
    slots: Mutex<Vec<WorkerSlot>>,
    exit_generation: Mutex<u32>,
}

impl MemScoreboard {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: Mutex::new(vec![WorkerSlot::default(); slots]),
            exit_generation: Mutex::new(0),
        }
    }
}

impl Scoreboard for MemScoreboard {
    fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn read_slot(&self, slot: usize) -> Result<WorkerSlot, ScoreboardError> {
        let slots = self.slots.lock();
        slots
            .get(slot)
            .cloned()
            .ok_or(ScoreboardError::SlotOutOfRange { slot, count: slots.len() })
    }

    fn write_slot(&self, slot: usize, record: &WorkerSlot) -> Result<(), ScoreboardError> {
        let mut slots = self.slots.lock();
        let count = slots.len();
        match slots.get_mut(slot) {
            Some(entry) => {
                *entry = record.clone();
                Ok(())
            }
            None => Err(ScoreboardError::SlotOutOfRange { slot, count }),
        }
    }

    fn exit_generation(&self) -> Result<u32, ScoreboardError> {
        Ok(*self.exit_generation.lock())
    }

    fn set_exit_generation(&self, generation: u32) -> Result<(), ScoreboardError> {
        *self.exit_generation.lock() = generation;
        Ok(())
    }

    fn reinit(&self) -> Result<(), ScoreboardError> {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            *slot = WorkerSlot::default();
        }
        Ok(())
    }
}
