// SPDX-License-Identifier: MIT OR Apache-2.0

//! C2: the inverted page table. One entry per physical frame, reverse
//! mapping frame -> `(pid, vaddr)`, plus second-chance (clock) victim
//! selection. Frame `0` is reserved non-user and is never handed out by
//! `alloc_frame`/selected by `get_victim`.

use alloc::vec::Vec;

use crate::error::{VmError, VmResult};
use crate::hashtable::HashTable;
use crate::types::{Frame, RawPid};

bitflags::bitflags! {
    /// Per-frame bookkeeping bits. `REFERENCED` drives the clock policy;
    /// `KERNEL` frames are never selected as victims: kernel frames are
    /// non-evictable.
    pub struct IptFlags: u8 {
        const REFERENCED = 0b01;
        const KERNEL     = 0b10;
    }
}

#[derive(Debug, Copy, Clone)]
enum IptEntry {
    Free,
    Resident { pid: RawPid, vaddr: u32, flags: IptFlags },
}

pub struct Ipt {
    entries: Vec<IptEntry>,
    /// `(pid, vaddr) -> frame`, kept in lockstep with `entries`
    /// so residency and reverse-lookup never diverge.
    map: HashTable,
    /// Clock hand, persists across calls.
    cursor: usize,
}

impl Ipt {
    /// `num_frames` includes the reserved frame 0.
    pub fn new(num_frames: usize) -> Self {
        let mut entries = alloc::vec![IptEntry::Free; num_frames];
        // Frame 0 is the reserved non-user sentinel: mark it permanently
        // kernel-owned and resident so it is never handed out or evicted.
        if !entries.is_empty() {
            entries[0] = IptEntry::Resident { pid: -1, vaddr: 0, flags: IptFlags::KERNEL };
        }
        Ipt { entries, map: HashTable::new(num_frames * 2), cursor: 1 }
    }

    pub fn num_frames(&self) -> usize { self.entries.len() }

    /// Returns the frame backing `(pid, vaddr)`, or `0` if not resident.
    pub fn lookup(&mut self, pid: RawPid, vaddr: u32) -> Frame {
        match self.map.lookup(pid, vaddr) {
            Some(frame) => {
                if let IptEntry::Resident { flags, .. } = &mut self.entries[frame] {
                    flags.insert(IptFlags::REFERENCED);
                }
                frame as Frame
            }
            None => 0,
        }
    }

    /// Finds a `Free` frame without marking it resident, for the caller's
    /// own bookkeeping (e.g. deciding whether eviction is necessary).
    pub fn find_free(&self) -> Option<Frame> {
        self.entries.iter().enumerate().find_map(|(i, e)| match (i, e) {
            (0, _) => None,
            (i, IptEntry::Free) => Some(i as Frame),
            _ => None,
        })
    }

    /// Marks `frame` resident for `(pid, vaddr)`. Precondition: the frame
    /// is currently `Free`.
    pub fn add(&mut self, pid: RawPid, vaddr: u32, frame: Frame) -> VmResult<()> {
        let idx = frame as usize;
        match self.entries.get(idx) {
            Some(IptEntry::Free) => {}
            _ => return Err(VmError::Duplicate),
        }
        self.map.insert(pid, vaddr, idx)?;
        self.entries[idx] = IptEntry::Resident { pid, vaddr, flags: IptFlags::empty() };
        Ok(())
    }

    /// Marks `frame` as `Kernel`-owned and resident, so `get_victim` will
    /// never select it. Used for the reserved frame 0 and any frames the
    /// allocator carves out for non-user purposes.
    pub fn reserve_kernel(&mut self, frame: Frame) {
        self.entries[frame as usize] = IptEntry::Resident { pid: -1, vaddr: 0, flags: IptFlags::KERNEL };
    }

    /// Transitions `frame` back to `Free`, removing its hash map entry.
    pub fn remove(&mut self, frame: Frame) {
        let idx = frame as usize;
        if let IptEntry::Resident { pid, vaddr, flags } = self.entries[idx] {
            if !flags.contains(IptFlags::KERNEL) {
                let _ = self.map.remove(pid, vaddr);
            }
        }
        self.entries[idx] = IptEntry::Free;
    }

    /// Removes every entry owned by `pid`, called from
    /// `addrspace_destroy`. Returns the freed frames.
    pub fn remove_pid(&mut self, pid: RawPid) -> Vec<Frame> {
        let mut freed = Vec::new();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if let IptEntry::Resident { pid: p, .. } = entry {
                if *p == pid {
                    *entry = IptEntry::Free;
                    freed.push(i as Frame);
                }
            }
        }
        self.map.clear_pid(pid);
        freed
    }

    /// Second-chance (clock) victim selection: advance a persistent cursor
    /// around the table, skipping kernel frames, clearing the reference
    /// bit of referenced user frames, and returning the first user frame
    /// found with the bit already clear.
    ///
    /// Ties are impossible by construction: the cursor always finds a
    /// victim within at most two full sweeps of the table, since a user
    /// frame it has already cleared cannot be referenced again without an
    /// intervening `lookup`.
    pub fn get_victim(&mut self) -> Option<(Frame, RawPid, u32)> {
        let n = self.entries.len();
        if n <= 1 {
            return None;
        }
        for _ in 0..(2 * n) {
            let i = self.cursor;
            self.cursor = (self.cursor + 1) % n;
            if i == 0 {
                continue;
            }
            match &mut self.entries[i] {
                IptEntry::Resident { flags, .. } if flags.contains(IptFlags::KERNEL) => continue,
                IptEntry::Resident { flags, .. } if flags.contains(IptFlags::REFERENCED) => {
                    flags.remove(IptFlags::REFERENCED);
                }
                IptEntry::Resident { pid, vaddr, .. } => return Some((i as Frame, *pid, *vaddr)),
                IptEntry::Free => continue,
            }
        }
        None
    }
}
