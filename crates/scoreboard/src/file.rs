// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed scoreboard.
//!
//! A regular file holding a small header followed by the slot array. Every
//! access is a positioned whole-slot read or write (`read_exact_at` /
//! `write_all_at`, which loop over short transfers and EINTR internally), so
//! no two writers ever share a file cursor and no write spans a slot
//! boundary.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::slot::{WorkerSlot, SLOT_LEN};
use crate::{Scoreboard, ScoreboardError};

const MAGIC: &[u8; 4] = b"HSB1";
const HEADER_LEN: usize = 16;
const EXIT_GENERATION_OFFSET: u64 = 8;

pub struct FileScoreboard {
    file: File,
    slots: usize,
}

impl FileScoreboard {
    /// Create (or adopt) the scoreboard file with `slots` entries.
    ///
    /// Called by the supervisor at first start. An existing valid file of the
    /// same geometry is adopted with its `exit_generation` intact and all
    /// slots zeroed; anything else is rewritten from scratch.
    pub fn create(path: &Path, slots: usize) -> Result<Self, ScoreboardError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let adopted = match read_header(&file) {
            Ok((count, _)) if count == slots => true,
            _ => false,
        };

        let board = Self { file, slots };
        if adopted {
            info!(path = %path.display(), slots, "adopting existing scoreboard file");
            board.reinit()?;
        } else {
            board.file.set_len((HEADER_LEN + slots * SLOT_LEN) as u64)?;
            board.write_header(0)?;
            board.zero_slots()?;
        }
        Ok(board)
    }

    /// Whether a usable scoreboard image exists at `path`. For callers that
    /// want a precise diagnostic before attaching (worker init, late
    /// logging paths).
    pub fn exists(path: &Path) -> bool {
        File::open(path).map(|file| read_header(&file).is_ok()).unwrap_or(false)
    }

    /// Open an existing scoreboard, validating the header. Called by each
    /// worker when it attaches the census in its own address space.
    pub fn open(path: &Path) -> Result<Self, ScoreboardError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let (slots, _) =
            read_header(&file).map_err(|_| ScoreboardError::BadMagic(PathBuf::from(path)))?;
        Ok(Self { file, slots })
    }

    fn write_header(&self, exit_generation: u32) -> Result<(), ScoreboardError> {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(MAGIC);
        header[4..8].copy_from_slice(&(self.slots as u32).to_le_bytes());
        header[8..12].copy_from_slice(&exit_generation.to_le_bytes());
        self.file.write_all_at(&header, 0)?;
        Ok(())
    }

    fn zero_slots(&self) -> Result<(), ScoreboardError> {
        let zeroed = [0u8; SLOT_LEN];
        for slot in 0..self.slots {
            self.file.write_all_at(&zeroed, slot_offset(slot))?;
        }
        Ok(())
    }

    fn check_bounds(&self, slot: usize) -> Result<(), ScoreboardError> {
        if slot >= self.slots {
            return Err(ScoreboardError::SlotOutOfRange { slot, count: self.slots });
        }
        Ok(())
    }
}

fn slot_offset(slot: usize) -> u64 {
    (HEADER_LEN + slot * SLOT_LEN) as u64
}

fn read_header(file: &File) -> Result<(usize, u32), ScoreboardError> {
    let mut header = [0u8; HEADER_LEN];
    file.read_exact_at(&mut header, 0)?;
    if &header[0..4] != MAGIC {
        return Err(ScoreboardError::BadMagic(PathBuf::new()));
    }
    let mut count = [0u8; 4];
    count.copy_from_slice(&header[4..8]);
    let mut generation = [0u8; 4];
    generation.copy_from_slice(&header[8..12]);
    Ok((u32::from_le_bytes(count) as usize, u32::from_le_bytes(generation)))
}

impl Scoreboard for FileScoreboard {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn read_slot(&self, slot: usize) -> Result<WorkerSlot, ScoreboardError> {
        self.check_bounds(slot)?;
        let mut buf = [0u8; SLOT_LEN];
        self.file.read_exact_at(&mut buf, slot_offset(slot))?;
        Ok(WorkerSlot::decode(&buf))
    }

    fn write_slot(&self, slot: usize, record: &WorkerSlot) -> Result<(), ScoreboardError> {
        self.check_bounds(slot)?;
        self.file.write_all_at(&record.encode(), slot_offset(slot))?;
        Ok(())
    }

    fn exit_generation(&self) -> Result<u32, ScoreboardError> {
        let mut buf = [0u8; 4];
        self.file.read_exact_at(&mut buf, EXIT_GENERATION_OFFSET)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn set_exit_generation(&self, generation: u32) -> Result<(), ScoreboardError> {
        self.file.write_all_at(&generation.to_le_bytes(), EXIT_GENERATION_OFFSET)?;
        Ok(())
    }

    fn reinit(&self) -> Result<(), ScoreboardError> {
        let exit_generation = self.exit_generation()?;
        self.file.set_len((HEADER_LEN + self.slots * SLOT_LEN) as u64)?;
        self.write_header(exit_generation)?;
        self.zero_slots()
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
