// SPDX-License-Identifier: MIT OR Apache-2.0

//! C1: a small open-addressed map from `(pid, vaddr)` to a slot index.
//!
//! The inverted page table (`ipt.rs`) is the only consumer, but the map
//! itself knows nothing about frames or residency — it is a generic
//! `Key -> usize` table, grounded in the source's separate `item`/`st`
//! modules (a `Key`+`index` `Item`, probed by a hash table keyed on
//! `Key`). Capacity is fixed at construction, at least twice the number
//! of entries the caller intends to store, so linear probing stays cheap.

use alloc::vec::Vec;

use crate::error::{VmError, VmResult};
use crate::types::{Key, RawPid};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Slot {
    Empty,
    Tombstone,
    Occupied(Key, usize),
}

/// Open-addressed, linearly-probed `(pid, vaddr) -> index` map.
pub struct HashTable {
    slots: Vec<Slot>,
}

impl HashTable {
    /// `capacity` is rounded up to the next power of two so the probe
    /// mask is a cheap `& (len - 1)`.
    pub fn new(capacity: usize) -> Self {
        let len = capacity.max(2).next_power_of_two();
        HashTable { slots: alloc::vec![Slot::Empty; len] }
    }

    fn hash(&self, key: Key) -> usize {
        // FNV-1a over the two fields; any decent mixing works since probing
        // handles collisions, we just want good spread across the table.
        let mut h: u64 = 0xcbf29ce484222325;
        for byte in key.pid.to_le_bytes().iter().chain(key.vaddr.to_le_bytes().iter()) {
            h ^= *byte as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h as usize) & (self.slots.len() - 1)
    }

    /// Inserts `(pid, vaddr) -> index`. Fails with `Duplicate` if the key
    /// is already present.
    pub fn insert(&mut self, pid: RawPid, vaddr: u32, index: usize) -> VmResult<()> {
        let key = Key::new(pid, vaddr);
        let mask = self.slots.len() - 1;
        let start = self.hash(key);
        let mut first_tombstone = None;
        for probe in 0..self.slots.len() {
            let i = (start + probe) & mask;
            match self.slots[i] {
                Slot::Occupied(k, _) if k == key => return Err(VmError::Duplicate),
                Slot::Tombstone if first_tombstone.is_none() => first_tombstone = Some(i),
                Slot::Empty => {
                    let dest = first_tombstone.unwrap_or(i);
                    self.slots[dest] = Slot::Occupied(key, index);
                    return Ok(());
                }
                _ => {}
            }
        }
        // Table is full of occupied/tombstone entries with no match: the
        // caller sized capacity >= 2x expected entries, so this indicates
        // a sizing bug rather than a normal runtime condition.
        if let Some(dest) = first_tombstone {
            self.slots[dest] = Slot::Occupied(key, index);
            return Ok(());
        }
        Err(VmError::Duplicate)
    }

    /// Looks up `(pid, vaddr)`, returning its stored index.
    pub fn lookup(&self, pid: RawPid, vaddr: u32) -> Option<usize> {
        let key = Key::new(pid, vaddr);
        let mask = self.slots.len() - 1;
        let start = self.hash(key);
        for probe in 0..self.slots.len() {
            let i = (start + probe) & mask;
            match self.slots[i] {
                Slot::Occupied(k, idx) if k == key => return Some(idx),
                Slot::Empty => return None,
                _ => {}
            }
        }
        None
    }

    /// Removes `(pid, vaddr)`, leaving a tombstone so later probe chains
    /// through this slot still find entries inserted before it.
    pub fn remove(&mut self, pid: RawPid, vaddr: u32) -> VmResult<()> {
        let key = Key::new(pid, vaddr);
        let mask = self.slots.len() - 1;
        let start = self.hash(key);
        for probe in 0..self.slots.len() {
            let i = (start + probe) & mask;
            match self.slots[i] {
                Slot::Occupied(k, _) if k == key => {
                    self.slots[i] = Slot::Tombstone;
                    return Ok(());
                }
                Slot::Empty => return Err(VmError::NotFound),
                _ => {}
            }
        }
        Err(VmError::NotFound)
    }

    /// Removes every entry belonging to `pid`, called from
    /// `addrspace_destroy`.
    pub fn clear_pid(&mut self, pid: RawPid) {
        for slot in self.slots.iter_mut() {
            if let Slot::Occupied(k, _) = slot {
                if k.pid == pid {
                    *slot = Slot::Tombstone;
                }
            }
        }
    }

    /// Removes and returns every `(vaddr, index)` entry belonging to
    /// `pid`. Used where the caller needs the indices, not just the fact
    /// that they're gone (e.g. `SwapFile::free_pid` needs the slot
    /// numbers to clear the allocation bitmap).
    pub fn take_pid(&mut self, pid: RawPid) -> Vec<(u32, usize)> {
        let mut taken = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Slot::Occupied(k, idx) = *slot {
                if k.pid == pid {
                    taken.push((k.vaddr, idx));
                    *slot = Slot::Tombstone;
                }
            }
        }
        taken
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.iter().filter(|s| matches!(s, Slot::Occupied(..))).count()
    }
}
