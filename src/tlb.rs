// SPDX-License-Identifier: MIT OR Apache-2.0

//! C5: the software TLB manager. A fixed-size, fully-associative array of
//! `(hi, lo)` entries. Every mutation is bracketed by raising and
//! restoring the CPU interrupt priority level; `IplGuard`
//! models `splhigh`/`splx` as a scoped token so that gets released on
//! every exit path, including early returns, without the caller having to
//! remember to call `splx`.

use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

use crate::types::{Frame, RawPid};

bitflags::bitflags! {
    /// The `lo`-word flags. Clear just the dirty bit with `remove()`
    /// (bitwise complement) — the source's `!TLBLO_DIRTY` is a logical-not
    /// on the whole word, which would also clear `VALID`.
    pub struct TlbLo: u8 {
        const VALID = 0b01;
        const DIRTY = 0b10;
    }
}

#[derive(Debug, Copy, Clone)]
struct TlbEntry {
    /// `None` is the invalid sentinel; `Some((pid, vaddr))` is the `hi`
    /// virtual tag.
    hi: Option<(RawPid, u32)>,
    frame: Frame,
    lo: TlbLo,
}

impl TlbEntry {
    const INVALID: TlbEntry = TlbEntry { hi: None, frame: 0, lo: TlbLo::empty() };

    fn is_valid(&self) -> bool { self.hi.is_some() && self.lo.contains(TlbLo::VALID) }
}

/// Raises the interrupt priority level for the lifetime of the guard and
/// restores it on drop. Here "the priority level" is tracked as a depth
/// counter on the manager itself, since this crate has no real CPU to
/// interrupt; what matters for testing is that every early return still
/// runs the restore.
pub struct IplGuard<'a> {
    tlb: &'a mut TlbManager,
}

impl<'a> Deref for IplGuard<'a> {
    type Target = TlbManager;
    fn deref(&self) -> &TlbManager { self.tlb }
}

impl<'a> DerefMut for IplGuard<'a> {
    fn deref_mut(&mut self) -> &mut TlbManager { self.tlb }
}

impl<'a> Drop for IplGuard<'a> {
    fn drop(&mut self) { self.tlb.spl_depth -= 1; }
}

pub struct TlbManager {
    entries: Vec<TlbEntry>,
    /// Round-robin victim cursor, persists across calls.
    cursor: usize,
    spl_depth: u32,
}

impl TlbManager {
    pub fn new(num_entries: usize) -> Self {
        TlbManager { entries: alloc::vec![TlbEntry::INVALID; num_entries.max(1)], cursor: 0, spl_depth: 0 }
    }

    fn raise_ipl(&mut self) -> IplGuard<'_> {
        self.spl_depth += 1;
        IplGuard { tlb: self }
    }

    /// Installs `(pid, vaddr) -> frame` into the first invalid slot, or
    /// overwrites the round-robin victim if every slot is valid. The
    /// previous occupant of an overwritten slot is silently dropped — its
    /// IPT entry stays resident.
    ///
    /// Returns `true` if a free slot was used, `false` if an entry was
    /// replaced — the fault handler uses this to update its free/replace
    /// counters.
    pub fn install(&mut self, pid: RawPid, vaddr: u32, frame: Frame, writable: bool) -> bool {
        let mut guard = self.raise_ipl();
        let mut lo = TlbLo::VALID;
        if writable {
            lo.insert(TlbLo::DIRTY);
        }
        if let Some(slot) = guard.entries.iter().position(|e| !e.is_valid()) {
            guard.entries[slot] = TlbEntry { hi: Some((pid, vaddr)), frame, lo };
            return true;
        }
        let victim = guard.cursor;
        guard.cursor = (guard.cursor + 1) % guard.entries.len();
        guard.entries[victim] = TlbEntry { hi: Some((pid, vaddr)), frame, lo };
        false
    }

    /// Rewrites the slot for `(pid, vaddr)` to the invalid sentinel, if
    /// present.
    pub fn invalidate(&mut self, pid: RawPid, vaddr: u32) {
        let mut guard = self.raise_ipl();
        if let Some(e) = guard.entries.iter_mut().find(|e| e.hi == Some((pid, vaddr))) {
            *e = TlbEntry::INVALID;
        }
    }

    /// Invalidates every entry. Used at context switch / address-space
    /// destruction.
    pub fn flush_all(&mut self) {
        let mut guard = self.raise_ipl();
        for e in guard.entries.iter_mut() {
            *e = TlbEntry::INVALID;
        }
    }

    /// Clears the writable (dirty) bit for `(pid, vaddr)`'s entry, used
    /// after a code page's first load completes. Using bitwise
    /// complement, not logical-not, so only the dirty bit changes.
    pub fn clear_dirty(&mut self, pid: RawPid, vaddr: u32) {
        let mut guard = self.raise_ipl();
        if let Some(e) = guard.entries.iter_mut().find(|e| e.hi == Some((pid, vaddr))) {
            e.lo.remove(TlbLo::DIRTY);
        }
    }

    /// Invalidates every entry belonging to `pid`. Used by
    /// `addrspace_destroy`.
    pub fn invalidate_pid(&mut self, pid: RawPid) {
        let mut guard = self.raise_ipl();
        for e in guard.entries.iter_mut() {
            if matches!(e.hi, Some((p, _)) if p == pid) {
                *e = TlbEntry::INVALID;
            }
        }
    }

    #[cfg(test)]
    fn find(&self, pid: RawPid, vaddr: u32) -> Option<(Frame, TlbLo)> {
        self.entries.iter().find(|e| e.hi == Some((pid, vaddr)) && e.is_valid()).map(|e| (e.frame, e.lo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_then_find() {
        let mut tlb = TlbManager::new(4);
        let used_free = tlb.install(1, 0x1000, 7, true);
        assert!(used_free);
        let (frame, lo) = tlb.find(1, 0x1000).unwrap();
        assert_eq!(frame, 7);
        assert!(lo.contains(TlbLo::VALID | TlbLo::DIRTY));
    }

    #[test]
    fn invalidate_clears_entry() {
        let mut tlb = TlbManager::new(4);
        tlb.install(1, 0x1000, 7, true);
        tlb.invalidate(1, 0x1000);
        assert!(tlb.find(1, 0x1000).is_none());
    }

    #[test]
    fn clear_dirty_only_touches_dirty_bit() {
        let mut tlb = TlbManager::new(4);
        tlb.install(1, 0x1000, 7, true);
        tlb.clear_dirty(1, 0x1000);
        let (frame, lo) = tlb.find(1, 0x1000).unwrap();
        assert_eq!(frame, 7);
        assert!(lo.contains(TlbLo::VALID));
        assert!(!lo.contains(TlbLo::DIRTY));
    }

    #[test]
    fn nth_plus_one_install_evicts_round_robin_cursor_target() {
        let mut tlb = TlbManager::new(2);
        assert!(tlb.install(1, 0x1000, 1, true));
        assert!(tlb.install(1, 0x2000, 2, true));
        // Both slots are valid now; the next install must replace slot 0
        // (cursor starts at 0) and advance the cursor to 1.
        let used_free = tlb.install(1, 0x3000, 3, true);
        assert!(!used_free);
        assert!(tlb.find(1, 0x1000).is_none());
        assert!(tlb.find(1, 0x3000).is_some());
        // The entry at 0x2000 survives; cursor has advanced past it.
        assert!(tlb.find(1, 0x2000).is_some());
        let used_free_again = tlb.install(1, 0x4000, 4, true);
        assert!(!used_free_again);
        assert!(tlb.find(1, 0x2000).is_none());
    }

    #[test]
    fn flush_all_clears_every_entry() {
        let mut tlb = TlbManager::new(4);
        tlb.install(1, 0x1000, 1, true);
        tlb.install(2, 0x2000, 2, true);
        tlb.flush_all();
        assert!(tlb.find(1, 0x1000).is_none());
        assert!(tlb.find(2, 0x2000).is_none());
    }

    #[test]
    fn invalidate_pid_only_touches_that_pid() {
        let mut tlb = TlbManager::new(4);
        tlb.install(1, 0x1000, 1, true);
        tlb.install(2, 0x1000, 2, true);
        tlb.invalidate_pid(1);
        assert!(tlb.find(1, 0x1000).is_none());
        assert!(tlb.find(2, 0x1000).is_some());
    }
}
