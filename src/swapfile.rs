// SPDX-License-Identifier: MIT OR Apache-2.0

//! C3: the swap file. A fixed number of page-sized slots on a block
//! device, allocated first-fit from a bitmap, with a `(pid, vaddr) ->
//! slot` side table. A page is never simultaneously
//! resident and on disk: `swap_in` removes the record it consumes,
//! `swap_out` only ever creates one after the frame has been evicted.

use alloc::vec::Vec;

use crate::collab::BlockDevice;
use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::hashtable::HashTable;
use crate::types::{RawPid, SegmentId, SwapSlot};

pub struct SwapFile {
    /// One bit per slot; `true` means allocated.
    bitmap: Vec<bool>,
    /// `(pid, vaddr) -> slot`.
    records: HashTable,
}

impl SwapFile {
    pub fn new(slots: usize) -> Self {
        SwapFile { bitmap: alloc::vec![false; slots], records: HashTable::new(slots * 2) }
    }

    pub fn num_slots(&self) -> usize { self.bitmap.len() }

    fn alloc_slot(&mut self) -> VmResult<SwapSlot> {
        self.bitmap
            .iter()
            .position(|&used| !used)
            .map(|i| {
                self.bitmap[i] = true;
                i as SwapSlot
            })
            .ok_or(VmError::SwapFull)
    }

    fn free_slot(&mut self, slot: SwapSlot) { self.bitmap[slot as usize] = false; }

    /// Writes `page` out for `(pid, vaddr)`. Code pages are discarded
    /// instead of written — they are re-read from the ELF image on the
    /// next miss — everything else is written to a freshly allocated
    /// slot. Fails with `SwapFull` if no slot is free.
    pub fn swap_out(
        &mut self,
        pid: RawPid,
        vaddr: u32,
        segment: SegmentId,
        page: &[u8; PAGE_SIZE],
        dev: &mut dyn BlockDevice,
    ) -> VmResult<()> {
        if segment == SegmentId::Code {
            return Ok(());
        }
        let slot = self.alloc_slot()?;
        if let Err(e) = dev.write(slot, page) {
            self.free_slot(slot);
            return Err(e);
        }
        if let Err(e) = self.records.insert(pid, vaddr, slot as usize) {
            self.free_slot(slot);
            return Err(e);
        }
        Ok(())
    }

    /// If `(pid, vaddr)` has a swap record, reads its slot into `page`,
    /// frees the slot, and returns `true`. Otherwise returns `false`
    /// without touching `page`.
    pub fn swap_in(
        &mut self,
        pid: RawPid,
        vaddr: u32,
        page: &mut [u8; PAGE_SIZE],
        dev: &mut dyn BlockDevice,
    ) -> VmResult<bool> {
        let Some(slot) = self.records.lookup(pid, vaddr) else {
            return Ok(false);
        };
        dev.read(slot as SwapSlot, page)?;
        self.records.remove(pid, vaddr).expect("record found above");
        self.free_slot(slot as SwapSlot);
        Ok(true)
    }

    /// Releases every slot belonging to `pid`, called at process exit.
    pub fn free_pid(&mut self, pid: RawPid) {
        for (_, slot) in self.records.take_pid(pid) {
            self.free_slot(slot as SwapSlot);
        }
    }

}
