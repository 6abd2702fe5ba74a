// SPDX-License-Identifier: MIT OR Apache-2.0

//! C4: per-process address spaces. Two loadable ELF segments (code,
//! data) plus a fixed-size stack immediately below `USERSTACK`
//! `address_segment` classifies a page-aligned address;
//! `load_page` reads one page of a segment's ELF contents, zero-padding
//! the tail past `filesz`.

use crate::collab::ElfSource;
use crate::config::{is_page_aligned, PAGE_SIZE, STACKPAGES, USERSTACK};
use crate::error::{VmError, VmResult};
use crate::types::SegmentId;

/// One loadable segment: a page range plus its backing ELF extent.
#[derive(Debug, Copy, Clone)]
pub struct Segment {
    pub vbase: u32,
    pub npages: u32,
    /// Offset of this segment within the ELF image.
    pub foff: u32,
    /// Bytes of the segment actually present in the ELF file; the
    /// remainder up to `memsz` is zero-filled.
    pub filesz: u32,
    pub memsz: u32,
}

impl Segment {
    fn vtop(&self) -> u32 { self.vbase + self.npages * PAGE_SIZE as u32 }

    fn contains(&self, vaddr: u32) -> bool { vaddr >= self.vbase && vaddr < self.vtop() }
}

/// A process's address space: code, data and stack.
#[derive(Debug, Copy, Clone)]
pub struct AddressSpace {
    pub code: Segment,
    pub data: Segment,
}

impl AddressSpace {
    /// Constructs an address space, rejecting malformed layouts where
    /// code and data overlap.
    pub fn new(code: Segment, data: Segment) -> VmResult<Self> {
        if !is_page_aligned(code.vbase) || !is_page_aligned(data.vbase) {
            return Err(VmError::EFault);
        }
        if code.vtop() > data.vbase && data.vtop() > code.vbase {
            return Err(VmError::EFault);
        }
        Ok(AddressSpace { code, data })
    }

    fn stack_base() -> u32 { USERSTACK - (STACKPAGES * PAGE_SIZE) as u32 }

    /// Classifies `vaddr` (already page-aligned) against code, then data,
    /// then stack — in that priority order, so a malformed overlap
    /// resolves to segment 1 first.
    pub fn classify(&self, vaddr: u32) -> VmResult<SegmentId> {
        if self.code.contains(vaddr) {
            Ok(SegmentId::Code)
        } else if self.data.contains(vaddr) {
            Ok(SegmentId::Data)
        } else if vaddr >= Self::stack_base() && vaddr < USERSTACK {
            Ok(SegmentId::Stack)
        } else {
            Err(VmError::EFault)
        }
    }

    fn segment(&self, id: SegmentId) -> Option<&Segment> {
        match id {
            SegmentId::Code => Some(&self.code),
            SegmentId::Data => Some(&self.data),
            SegmentId::Stack => None,
        }
    }

    /// Reads one page of `segment`'s ELF contents at `vaddr` into `dest`,
    /// zero-padding anything past `filesz`. Never called for the stack
    /// segment — stack pages are zero-filled in place by the caller.
    pub fn load_page(
        &self,
        vaddr: u32,
        segment: SegmentId,
        elf: &mut dyn ElfSource,
        dest: &mut [u8; PAGE_SIZE],
    ) -> VmResult<()> {
        let seg = self.segment(segment).ok_or(VmError::EFault)?;
        let offset_in_segment = vaddr - seg.vbase;
        let file_offset = seg.foff + offset_in_segment;
        elf.read(segment, file_offset, dest)?;
        // Zero anything beyond filesz that the ElfSource didn't already
        // clear, covering implementations that only guarantee bytes up
        // to filesz are meaningful.
        let filesz_remaining = seg.filesz.saturating_sub(offset_in_segment) as usize;
        if filesz_remaining < dest.len() {
            for b in &mut dest[filesz_remaining..] {
                *b = 0;
            }
        }
        Ok(())
    }
}
