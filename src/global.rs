// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional single-instance ambient access to a `VmContext`, for
//! production callers that don't want to thread a context reference
//! through every call site. Testable callers should prefer constructing
//! a `VmContext` directly (`context::VmContext::new`) and calling its
//! methods, as this crate's own tests do.
//!
//! The IPT, swap bitmap, TLB cursor and fault counters form one VM
//! context; a production boot path can keep a single global instance of
//! it, which is what this module provides. Collaborators are boxed trait
//! objects rather than a fixed concrete type, since the real block
//! device and ELF reader are external collaborators this crate does not
//! implement.

use alloc::boxed::Box;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::collab::{BlockDevice, ElfSource};
use crate::config::PAGE_SIZE;
use crate::context::VmContext;
use crate::error::VmResult;
use crate::types::SwapSlot;

/// Boxed `BlockDevice`, so the global instance isn't generic over the
/// caller's concrete disk type.
pub type DynBlockDevice = Box<dyn BlockDevice + Send>;
/// Boxed `ElfSource`, likewise.
pub type DynElfSource = Box<dyn ElfSource + Send>;

impl BlockDevice for DynBlockDevice {
    fn read(&mut self, slot: SwapSlot, buf: &mut [u8; PAGE_SIZE]) -> VmResult<()> { (**self).read(slot, buf) }

    fn write(&mut self, slot: SwapSlot, buf: &[u8; PAGE_SIZE]) -> VmResult<()> { (**self).write(slot, buf) }
}

impl ElfSource for DynElfSource {
    fn read(&mut self, segment: crate::types::SegmentId, offset: u32, dest: &mut [u8]) -> VmResult<()> {
        (**self).read(segment, offset, dest)
    }
}

lazy_static! {
    static ref VM: Mutex<Option<VmContext<DynBlockDevice, DynElfSource>>> = Mutex::new(None);
}

/// Installs the global VM context. Intended to be called exactly once,
/// at boot, before `with`/`with_mut` are used; a second call replaces
/// the previous instance (mirrors `addrspace_destroy`-style teardown,
/// not an error condition this crate enforces).
pub fn init(num_frames: usize, swap_slots: usize, num_tlb: usize, dev: DynBlockDevice, elf: DynElfSource) {
    *VM.lock() = Some(VmContext::new(num_frames, swap_slots, num_tlb, dev, elf));
}

/// Tears down the global instance, dropping its collaborators. Called at
/// shutdown.
pub fn teardown() { *VM.lock() = None; }

/// Calls `f` with the global `VmContext`. Panics if `init` was never
/// called.
pub fn with<F, R>(f: F) -> R
where
    F: FnOnce(&VmContext<DynBlockDevice, DynElfSource>) -> R,
{
    let guard = VM.lock();
    f(guard.as_ref().expect("vm::global::init was not called"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::test_support::{FakeElf, MemDisk};

    #[test]
    fn init_then_with_reaches_the_context() {
        let dev: DynBlockDevice = Box::new(MemDisk::new(4));
        let elf: DynElfSource = Box::new(FakeElf::new(0, 0, 0, 0));
        init(4, 4, 4, dev, elf);
        with(|ctx| assert_eq!(ctx.stats().total, 0));
        teardown();
    }
}
