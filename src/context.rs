// SPDX-License-Identifier: MIT OR Apache-2.0

//! C6 and C0b: the fault handler protocol and the `VmContext` that owns
//! every other component behind one lock. This is the only module that
//! needs C1-C5 simultaneously, so it is where the numbered fault steps
//! live.

use alloc::vec::Vec;

use spin::Mutex;

use crate::addrspace::AddressSpace;
use crate::collab::{BlockDevice, ElfSource, ProcessDirectory};
use crate::config::{page_align, PAGE_SIZE};
use crate::debug_vm;
use crate::error::{VmError, VmResult};
use crate::fault::{FaultStats, FaultType};
use crate::ipt::Ipt;
use crate::swapfile::SwapFile;
use crate::tlb::TlbManager;
use crate::types::{RawPid, SegmentId};

/// Everything the fault handler mutates, guarded by a single spinlock
/// a single spinlock held only for O(frames) or O(slots) work, never
/// across disk I/O. `frames` is this crate's
/// stand-in for physical RAM: the real kernel writes through the user
/// virtual address the MMU maps to a frame, which this software model
/// has no MMU to perform, so frame contents are addressed directly by
/// frame number instead.
struct VmState {
    ipt: Ipt,
    swap: SwapFile,
    tlb: TlbManager,
    stats: FaultStats,
    frames: Vec<[u8; PAGE_SIZE]>,
}

impl VmState {
    fn read_frame(&self, frame: u32, dest: &mut [u8; PAGE_SIZE]) { dest.copy_from_slice(&self.frames[frame as usize]); }

    fn write_frame(&mut self, frame: u32, src: &[u8; PAGE_SIZE]) { self.frames[frame as usize].copy_from_slice(src); }
}

/// Owns the VM subsystem's state. Generic over the two I/O collaborators
/// (§6) so tests can supply in-memory stand-ins; `ProcessDirectory` is
/// taken per-call instead, since it is the caller's view of "the current
/// process," not state this crate owns.
pub struct VmContext<D, E> {
    state: Mutex<VmState>,
    dev: Mutex<D>,
    elf: Mutex<E>,
}

impl<D: BlockDevice, E: ElfSource> VmContext<D, E> {
    pub fn new(num_frames: usize, swap_slots: usize, num_tlb: usize, dev: D, elf: E) -> Self {
        VmContext {
            state: Mutex::new(VmState {
                ipt: Ipt::new(num_frames),
                swap: SwapFile::new(swap_slots),
                tlb: TlbManager::new(num_tlb),
                stats: FaultStats::new(),
                frames: alloc::vec![[0u8; PAGE_SIZE]; num_frames],
            }),
            dev: Mutex::new(dev),
            elf: Mutex::new(elf),
        }
    }

    pub fn stats(&self) -> FaultStats { self.state.lock().stats }

    /// `addrspace_destroy(pid)`: tears down every IPT entry, swap slot and
    /// TLB entry belonging to `pid`, at process exit.
    pub fn addrspace_destroy(&self, pid: RawPid) {
        let mut st = self.state.lock();
        st.ipt.remove_pid(pid);
        st.swap.free_pid(pid);
        st.tlb.invalidate_pid(pid);
    }

    /// Reads back frame contents for a resident `(pid, vaddr)`, for tests
    /// that want to confirm a load or zero-fill actually happened.
    #[cfg(any(test, feature = "test-support"))]
    pub fn peek(&self, pid: RawPid, vaddr: u32) -> Option<[u8; PAGE_SIZE]> {
        let mut st = self.state.lock();
        let frame = st.ipt.lookup(pid, vaddr);
        if frame == 0 {
            return None;
        }
        let mut buf = [0u8; PAGE_SIZE];
        st.read_frame(frame, &mut buf);
        Some(buf)
    }

    /// `vm_fault(fault_type, vaddr)`, the sole entry point from the trap
    /// handler. Returns `Ok(())` to retry the faulting
    /// instruction, or an error the caller terminates the faulting
    /// process with.
    pub fn fault(&self, procs: &dyn ProcessDirectory, fault_type: FaultType, fault_vaddr: u32) -> VmResult<()> {
        let va = page_align(fault_vaddr);

        // Step 2: READONLY means a write landed on code, which this
        // design only ever maps writable-until-loaded then read-only.
        if fault_type == FaultType::Readonly {
            return Err(VmError::ReadonlyWrite);
        }

        // Step 3: a current process with a bound address space.
        let pid = procs.current_pid().ok_or(VmError::EFault)?;
        let as_ = procs.current_as().ok_or(VmError::EFault)?;

        // Step 4: classify into code/data/stack.
        let seg = as_.classify(va)?;

        // Step 5/6: already-resident frame is the fast path.
        let resident = self.state.lock().ipt.lookup(pid, va);
        if resident != 0 {
            debug_vm!("vm_fault: resident hit pid={} va={:#x} frame={}", pid, va, resident);
            let writable = seg != SegmentId::Code;
            let mut st = self.state.lock();
            let used_free = st.tlb.install(pid, va, resident, writable);
            record_install(&mut st.stats, used_free);
            return Ok(());
        }

        // Step 7a: allocate, evicting a victim if nothing is free.
        let frame = match self.state.lock().ipt.find_free() {
            Some(frame) => frame,
            None => self.evict_one(procs)?,
        };

        // Step 7b: IPT insertion precedes the I/O that fills the frame,
        // so a nested translation during the load below finds the frame
        // already resident.
        {
            let mut st = self.state.lock();
            st.ipt.add(pid, va, frame).map_err(|_| VmError::EFault)?;
            // Step 7c: always writable during load.
            let used_free = st.tlb.install(pid, va, frame, true);
            record_install(&mut st.stats, used_free);
        }

        // Step 7d: source the page's contents.
        if let Err(e) = self.populate(pid, va, seg, as_, frame) {
            let mut st = self.state.lock();
            st.ipt.remove(frame);
            st.tlb.invalidate(pid, va);
            return Err(e);
        }

        if seg == SegmentId::Code {
            // Step 7e: clear the writable bit last, after the load under
            // a writable mapping succeeded.
            self.state.lock().tlb.clear_dirty(pid, va);
        }

        Ok(())
    }

    /// Evicts one victim frame and returns it, freshly `Free`. Runs the
    /// second-chance scan and swap-out with the state lock dropped across
    /// the device write; never block while holding the lock.
    fn evict_one(&self, procs: &dyn ProcessDirectory) -> VmResult<u32> {
        let (vframe, vpid, vva) = self.state.lock().ipt.get_victim().ok_or(VmError::SwapFull)?;
        let victim_as = procs.as_of(vpid).ok_or(VmError::EFault)?;
        let victim_seg = victim_as.classify(vva)?;

        let mut page = [0u8; PAGE_SIZE];
        self.state.lock().read_frame(vframe, &mut page);

        {
            let mut dev = self.dev.lock();
            let mut st = self.state.lock();
            st.swap.swap_out(vpid, vva, victim_seg, &page, &mut *dev)?;
        }

        // TLB invalidation of the victim precedes any reuse of its frame
        // so a concurrent fault can never observe it pointing at stale data.
        let mut st = self.state.lock();
        st.tlb.invalidate(vpid, vva);
        st.ipt.remove(vframe);
        Ok(vframe)
    }

    /// Step 7d: for code/data, swap-in takes priority over a fresh ELF
    /// read; for the stack, swap-in takes priority over zero-fill.
    fn populate(&self, pid: RawPid, vaddr: u32, seg: SegmentId, as_: &AddressSpace, frame: u32) -> VmResult<()> {
        let mut page = [0u8; PAGE_SIZE];
        let found = {
            let mut dev = self.dev.lock();
            let mut st = self.state.lock();
            st.swap.swap_in(pid, vaddr, &mut page, &mut *dev)?
        };
        if found {
            self.state.lock().write_frame(frame, &page);
            return Ok(());
        }
        match seg {
            SegmentId::Stack => {
                self.state.lock().write_frame(frame, &[0u8; PAGE_SIZE]);
            }
            SegmentId::Code | SegmentId::Data => {
                let mut elf = self.elf.lock();
                as_.load_page(vaddr, seg, &mut *elf, &mut page)?;
                self.state.lock().write_frame(frame, &page);
            }
        }
        Ok(())
    }
}

fn record_install(stats: &mut FaultStats, used_free: bool) {
    if used_free {
        stats.record_free();
    } else {
        stats.record_replace();
    }
}

/// `vm_tlbshootdown(ts)`: fatal. This is a single-CPU design; SMP TLB
/// shootdown is out of scope.
pub fn vm_tlbshootdown() -> ! { panic!("vm_tlbshootdown: SMP TLB shootdown is not supported") }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrspace::Segment;
    use crate::collab::test_support::{FakeElf, FakeProcesses, MemDisk};

    const NUM_FRAMES: usize = 4;
    const SWAP_SLOTS: usize = 4;
    const NUM_TLB: usize = 4;

    fn ctx() -> VmContext<MemDisk, FakeElf> {
        VmContext::new(NUM_FRAMES, SWAP_SLOTS, NUM_TLB, MemDisk::new(SWAP_SLOTS), FakeElf::new(0xAA, PAGE_SIZE, 0xBB, PAGE_SIZE))
    }

    fn sample_as() -> AddressSpace {
        AddressSpace::new(
            Segment { vbase: 0x0040_0000, npages: 2, foff: 0, filesz: PAGE_SIZE as u32, memsz: 2 * PAGE_SIZE as u32 },
            Segment { vbase: 0x0060_0000, npages: 2, foff: 0, filesz: PAGE_SIZE as u32, memsz: 2 * PAGE_SIZE as u32 },
        )
        .unwrap()
    }

    fn one_process(pid: RawPid) -> FakeProcesses {
        let mut procs = FakeProcesses::new();
        procs.insert(pid, sample_as());
        procs.set_current(Some(pid));
        procs
    }

    #[test]
    fn cold_code_fault_loads_and_clears_dirty() {
        let ctx = ctx();
        let procs = one_process(1);
        ctx.fault(&procs, FaultType::Read, 0x0040_0100).unwrap();
        let page = ctx.peek(1, 0x0040_0000).unwrap();
        assert_eq!(page[0], 0xAA);
        let stats = ctx.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.resolved_free, 1);
    }

    #[test]
    fn write_to_code_is_readonly_write_fatal() {
        let ctx = ctx();
        let procs = one_process(1);
        ctx.fault(&procs, FaultType::Read, 0x0040_0100).unwrap();
        let err = ctx.fault(&procs, FaultType::Readonly, 0x0040_0100).unwrap_err();
        assert_eq!(err, VmError::ReadonlyWrite);
    }

    #[test]
    fn stack_first_touch_zero_fills() {
        let ctx = ctx();
        let procs = one_process(1);
        let stack_addr = crate::config::USERSTACK - crate::config::PAGE_SIZE as u32;
        ctx.fault(&procs, FaultType::Write, stack_addr).unwrap();
        let page = ctx.peek(1, stack_addr).unwrap();
        assert!(page.iter().all(|&b| b == 0));
    }

    #[test]
    fn resident_hit_skips_reload_and_counts_as_free_again() {
        let ctx = ctx();
        let procs = one_process(1);
        ctx.fault(&procs, FaultType::Read, 0x0060_0000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();
        assert_eq!(ctx.stats().total, 2);
    }

    #[test]
    fn eviction_then_swap_in_round_trips_data_page() {
        let ctx = ctx();
        let mut procs = one_process(1);
        procs.insert(2, sample_as());

        // Fill every non-reserved frame with process 1's data pages.
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0060_1000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0040_0000).unwrap();
        assert!(ctx.state.lock().ipt.find_free().is_none());

        procs.set_current(Some(2));
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();

        procs.set_current(Some(1));
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();
        let page = ctx.peek(1, 0x0060_0000).unwrap();
        assert_eq!(page[0], 0xBB);
    }

    #[test]
    fn efault_outside_any_segment() {
        let ctx = ctx();
        let procs = one_process(1);
        let err = ctx.fault(&procs, FaultType::Read, 0x1000_0000).unwrap_err();
        assert_eq!(err, VmError::EFault);
    }

    #[test]
    fn no_current_process_is_efault() {
        let ctx = ctx();
        let procs = FakeProcesses::new();
        let err = ctx.fault(&procs, FaultType::Read, 0x0040_0000).unwrap_err();
        assert_eq!(err, VmError::EFault);
    }

    #[test]
    fn addrspace_destroy_clears_ipt_swap_and_tlb() {
        let ctx = ctx();
        let mut procs = one_process(1);
        procs.insert(2, sample_as());
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0060_1000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0040_0000).unwrap();
        // Evict process 1's page by having process 2 fault, so process 1
        // has state in both the IPT and the swap file before destruction.
        procs.set_current(Some(2));
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();

        ctx.addrspace_destroy(1);

        let mut dummy = [0u8; PAGE_SIZE];
        let mut dev = ctx.dev.lock();
        let mut st = ctx.state.lock();
        assert_eq!(st.ipt.lookup(1, 0x0060_1000), 0);
        assert!(!st.swap.swap_in(1, 0x0060_0000, &mut dummy, &mut *dev).unwrap());
    }

    #[test]
    fn victim_code_page_is_discarded_not_written_to_swap() {
        let ctx = ctx();
        let mut procs = one_process(1);
        procs.insert(2, sample_as());

        // Fill frames in an order that puts process 1's code page first in
        // clock order, so it is selected as the victim below.
        ctx.fault(&procs, FaultType::Read, 0x0040_0000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0060_1000).unwrap();
        assert!(ctx.state.lock().ipt.find_free().is_none());

        procs.set_current(Some(2));
        ctx.fault(&procs, FaultType::Write, 0x0040_0000).unwrap();

        // The evicted code page must not have caused a disk write.
        assert_eq!(ctx.dev.lock().writes(), 0);

        // Later, process 1 re-faulting on that address re-reads from the
        // ELF image rather than finding a (nonexistent) swap record.
        procs.set_current(Some(1));
        ctx.fault(&procs, FaultType::Read, 0x0040_0000).unwrap();
        let page = ctx.peek(1, 0x0040_0000).unwrap();
        assert_eq!(page[0], 0xAA);
    }

    #[test]
    fn swap_exhaustion_terminates_with_swap_full() {
        let ctx = VmContext::new(NUM_FRAMES, 0, NUM_TLB, MemDisk::new(0), FakeElf::new(0xAA, PAGE_SIZE, 0xBB, PAGE_SIZE));
        let mut procs = one_process(1);
        procs.insert(2, sample_as());
        ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0060_1000).unwrap();
        ctx.fault(&procs, FaultType::Write, 0x0040_0000).unwrap();
        procs.set_current(Some(2));
        let err = ctx.fault(&procs, FaultType::Write, 0x0060_0000).unwrap_err();
        assert_eq!(err, VmError::SwapFull);
    }
}
