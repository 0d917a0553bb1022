// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Startup/backpressure ring buffer.
//!
//! A byte-oriented circular buffer holding variable-length entries. Each
//! entry is prefixed with a small block header so reads can find entry
//! boundaries without external bookkeeping:
//!
//! ```text
//! +--------------------------- mem (capacity bytes) ---------------------------+
//! | ... | "SHM\0" | status | size | entry bytes | "SHM\0" | status | size | ...|
//! +------^----------------------------------------------^----------------------+
//!        read cursor                                    write cursor
//! ```
//!
//! Two modes: static (fixed capacity, overflow fails) and dynamic (grows
//! lazily in `step` increments up to `max` when a push does not fit, never
//! shrinks). A push never overwrites unread data.
//!
//! The buffer does no internal locking: the owning [`crate::user::UserState`]
//! serializes push/pull sequences under its lock.

use crate::error::{DltError, Result};

/// Marker bytes starting every entry block header.
const BLOCK_MARKER: [u8; 4] = *b"SHM\0";
/// Status byte of a committed entry.
const BLOCK_STATUS_USED: u8 = 2;
/// Marker + status + u32 entry size.
const BLOCK_HEAD_SIZE: usize = 9;

/// Byte ring buffer with per-entry block headers.
pub struct DltBuffer {
    mem: Vec<u8>,
    /// Capacity ceiling; equals `mem.len()` in static mode.
    max_size: usize,
    /// Growth increment; 0 in static mode.
    step_size: usize,
    write: usize,
    read: usize,
    count: usize,
}

impl DltBuffer {
    /// Fixed-capacity buffer; pushes beyond capacity fail.
    pub fn new_static(size: usize) -> Result<Self> {
        if size <= BLOCK_HEAD_SIZE {
            return Err(DltError::WrongParameter("buffer size too small"));
        }
        Ok(Self {
            mem: vec![0; size],
            max_size: size,
            step_size: 0,
            write: 0,
            read: 0,
            count: 0,
        })
    }

    /// Growable buffer: allocated at `min`, grown in `step` increments up
    /// to `max` when a push does not fit.
    pub fn new_dynamic(min: usize, max: usize, step: usize) -> Result<Self> {
        if min <= BLOCK_HEAD_SIZE || min > max || step == 0 {
            return Err(DltError::WrongParameter("buffer geometry"));
        }
        Ok(Self {
            mem: vec![0; min],
            max_size: max,
            step_size: step,
            write: 0,
            read: 0,
            count: 0,
        })
    }

    /// Current allocated capacity in bytes.
    pub fn total_size(&self) -> usize {
        self.mem.len()
    }

    /// Bytes occupied by entries and their block headers.
    pub fn used_size(&self) -> usize {
        if self.count == 0 {
            0
        } else if self.write > self.read {
            self.write - self.read
        } else if self.write < self.read {
            self.mem.len() - self.read + self.write
        } else {
            self.mem.len()
        }
    }

    /// Number of buffered entries.
    pub fn message_count(&self) -> usize {
        self.count
    }

    fn free(&self) -> usize {
        self.mem.len() - self.used_size()
    }

    /// Whether an entry of `needed` bytes could be accepted: directly
    /// (static) or after growing to the capacity ceiling (dynamic).
    pub fn check_size(&self, needed: usize) -> bool {
        let headroom = self.max_size - self.mem.len();
        self.free() + headroom >= needed + BLOCK_HEAD_SIZE
    }

    /// Append one entry.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.push3(data, &[], &[])
    }

    /// Append one entry composed of up to three parts (header pieces +
    /// payload are stored as a single block).
    pub fn push3(&mut self, part1: &[u8], part2: &[u8], part3: &[u8]) -> Result<()> {
        let total = part1.len() + part2.len() + part3.len();
        if total == 0 {
            return Err(DltError::WrongParameter("empty entry"));
        }
        if total > u32::MAX as usize {
            return Err(DltError::WrongParameter("entry too large"));
        }
        let required = total + BLOCK_HEAD_SIZE;

        while self.free() < required && self.mem.len() < self.max_size {
            self.grow();
        }
        if self.free() < required {
            return Err(DltError::BufferFull);
        }

        let mut head = [0u8; BLOCK_HEAD_SIZE];
        head[..4].copy_from_slice(&BLOCK_MARKER);
        head[4] = BLOCK_STATUS_USED;
        head[5..9].copy_from_slice(&(total as u32).to_le_bytes());
        self.write_bytes(&head);
        self.write_bytes(part1);
        self.write_bytes(part2);
        self.write_bytes(part3);
        self.count += 1;
        Ok(())
    }

    /// Copy out and remove the oldest entry. `Ok(None)` when empty; the
    /// entry stays buffered if `dst` is too small.
    pub fn pull(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        self.take(Some(dst), true)
    }

    /// Copy out the oldest entry without removing it.
    pub fn copy(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        self.take(Some(dst), false)
    }

    /// Discard the oldest entry, returning its size.
    pub fn remove(&mut self) -> Result<Option<usize>> {
        self.take(None, true)
    }

    fn take(&mut self, dst: Option<&mut [u8]>, consume: bool) -> Result<Option<usize>> {
        if self.count == 0 {
            return Ok(None);
        }

        let mut head = [0u8; BLOCK_HEAD_SIZE];
        self.read_bytes(self.read, &mut head);
        if head[..4] != BLOCK_MARKER || head[4] != BLOCK_STATUS_USED {
            // Cursors no longer point at a block boundary; the only safe
            // recovery is dropping everything buffered.
            log::error!(
                "[BUF] block marker mismatch at read={}, resetting {} entries",
                self.read,
                self.count
            );
            self.reset();
            return Err(DltError::WrongParameter("ring buffer corrupted"));
        }
        let size = u32::from_le_bytes([head[5], head[6], head[7], head[8]]) as usize;

        if let Some(dst) = dst {
            if dst.len() < size {
                return Err(DltError::WrongParameter("destination smaller than entry"));
            }
            let data_at = (self.read + BLOCK_HEAD_SIZE) % self.mem.len();
            self.read_bytes(data_at, &mut dst[..size]);
        }

        if consume {
            self.read = (self.read + BLOCK_HEAD_SIZE + size) % self.mem.len();
            self.count -= 1;
        }
        Ok(Some(size))
    }

    /// Drop all entries.
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
        self.count = 0;
    }

    // Grow by one step (capped at max), unwrapping the ring so live entries
    // stay contiguous from offset 0.
    fn grow(&mut self) {
        let old_cap = self.mem.len();
        let new_cap = (old_cap + self.step_size).min(self.max_size);
        debug_assert!(new_cap > old_cap);

        let used = self.used_size();
        let mut new_mem = vec![0u8; new_cap];
        if used > 0 {
            if self.write > self.read {
                new_mem[..used].copy_from_slice(&self.mem[self.read..self.write]);
            } else {
                let tail = old_cap - self.read;
                new_mem[..tail].copy_from_slice(&self.mem[self.read..]);
                new_mem[tail..used].copy_from_slice(&self.mem[..self.write]);
            }
        }
        log::debug!(
            "[BUF] grown {} -> {} bytes ({} entries, {} bytes used)",
            old_cap,
            new_cap,
            self.count,
            used
        );
        self.mem = new_mem;
        self.read = 0;
        self.write = used;
    }

    fn write_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let cap = self.mem.len();
        let first = data.len().min(cap - self.write);
        self.mem[self.write..self.write + first].copy_from_slice(&data[..first]);
        if first < data.len() {
            self.mem[..data.len() - first].copy_from_slice(&data[first..]);
        }
        self.write = (self.write + data.len()) % cap;
    }

    fn read_bytes(&self, at: usize, dst: &mut [u8]) {
        let cap = self.mem.len();
        let first = dst.len().min(cap - at);
        dst[..first].copy_from_slice(&self.mem[at..at + first]);
        if first < dst.len() {
            let rest = dst.len() - first;
            dst[first..].copy_from_slice(&self.mem[..rest]);
        }
    }
}
