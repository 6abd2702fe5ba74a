// SPDX-License-Identifier: MIT OR Apache-2.0

//! §6's external interfaces, expressed as traits so the fault handler can
//! be exercised without a real kernel around it — the same shape as the
//! teacher kernel's `ProcessDirectory`-equivalent `SystemServices`, but
//! narrowed to exactly what this crate's fault path consumes.

use crate::addrspace::AddressSpace;
use crate::config::PAGE_SIZE;
use crate::error::VmResult;
use crate::types::{RawPid, SegmentId};

/// `proc_current_pid`, `proc_current_as`, `proc_get_as`.
pub trait ProcessDirectory {
    fn current_pid(&self) -> Option<RawPid>;
    fn current_as(&self) -> Option<&AddressSpace>;
    fn as_of(&self, pid: RawPid) -> Option<&AddressSpace>;
}

/// Block-device I/O against the SWAPFILE device, at page granularity.
pub trait BlockDevice {
    fn read(&mut self, slot: crate::types::SwapSlot, buf: &mut [u8; PAGE_SIZE]) -> VmResult<()>;
    fn write(&mut self, slot: crate::types::SwapSlot, buf: &[u8; PAGE_SIZE]) -> VmResult<()>;
}

/// ELF image reader, scoped to one segment at a time.
pub trait ElfSource {
    fn read(&mut self, segment: SegmentId, offset: u32, dest: &mut [u8]) -> VmResult<()>;
}

/// In-memory stand-ins for `BlockDevice`/`ElfSource`/`ProcessDirectory`,
/// used by this crate's own tests and available to downstream crates that
/// want to exercise `VmContext` without real disk/ELF backing.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;

    use super::*;
    use crate::error::VmError;

    /// A swap device backed by a `Vec` of pages, for tests.
    pub struct MemDisk {
        pages: Vec<[u8; PAGE_SIZE]>,
        writes: usize,
    }

    impl MemDisk {
        pub fn new(slots: usize) -> Self { MemDisk { pages: alloc::vec![[0u8; PAGE_SIZE]; slots], writes: 0 } }

        pub fn writes(&self) -> usize { self.writes }
    }

    impl BlockDevice for MemDisk {
        fn read(&mut self, slot: crate::types::SwapSlot, buf: &mut [u8; PAGE_SIZE]) -> VmResult<()> {
            let page = self.pages.get(slot as usize).ok_or(VmError::IoError)?;
            buf.copy_from_slice(page);
            Ok(())
        }

        fn write(&mut self, slot: crate::types::SwapSlot, buf: &[u8; PAGE_SIZE]) -> VmResult<()> {
            let page = self.pages.get_mut(slot as usize).ok_or(VmError::IoError)?;
            page.copy_from_slice(buf);
            self.writes += 1;
            Ok(())
        }
    }

    /// An ELF image that is a single byte pattern per segment, with a
    /// configurable `filesz` so zero-padding beyond it can be exercised.
    #[derive(Clone)]
    pub struct FakeElf {
        /// (fill byte, filesz) per segment.
        code: (u8, usize),
        data: (u8, usize),
    }

    impl FakeElf {
        pub fn new(code_fill: u8, code_filesz: usize, data_fill: u8, data_filesz: usize) -> Self {
            FakeElf { code: (code_fill, code_filesz), data: (data_fill, data_filesz) }
        }
    }

    impl ElfSource for FakeElf {
        fn read(&mut self, segment: SegmentId, offset: u32, dest: &mut [u8]) -> VmResult<()> {
            let (fill, filesz) = match segment {
                SegmentId::Code => self.code,
                SegmentId::Data => self.data,
                SegmentId::Stack => return Err(VmError::EFault),
            };
            let offset = offset as usize;
            for (i, byte) in dest.iter_mut().enumerate() {
                *byte = if offset + i < filesz { fill } else { 0 };
            }
            Ok(())
        }
    }

    /// A directory of address spaces keyed by pid, with one "current"
    /// process.
    #[derive(Default)]
    pub struct FakeProcesses {
        current: Option<RawPid>,
        spaces: BTreeMap<RawPid, AddressSpace>,
    }

    impl FakeProcesses {
        pub fn new() -> Self { Self::default() }

        pub fn insert(&mut self, pid: RawPid, as_: AddressSpace) { self.spaces.insert(pid, as_); }

        pub fn set_current(&mut self, pid: Option<RawPid>) { self.current = pid; }
    }

    impl ProcessDirectory for FakeProcesses {
        fn current_pid(&self) -> Option<RawPid> { self.current }

        fn current_as(&self) -> Option<&AddressSpace> { self.current.and_then(|p| self.spaces.get(&p)) }

        fn as_of(&self, pid: RawPid) -> Option<&AddressSpace> { self.spaces.get(&pid) }
    }
}
