// SPDX-License-Identifier: MIT OR Apache-2.0

//! Geometry constants for the simulated machine. These are fixed at boot
//! on the real target, so they are `const`s here rather than anything
//! parsed at runtime.

/// Page size in bytes, and the alignment of every vaddr/paddr this crate
/// hands out.
pub const PAGE_SIZE: usize = 4096;

/// Mask that clears the offset-within-page bits, i.e. `addr & PAGE_FRAME`
/// page-aligns `addr` down.
pub const PAGE_FRAME: u32 = !(PAGE_SIZE as u32 - 1);

/// Number of fully-associative hardware TLB entries.
pub const NUM_TLB: usize = 64;

/// Number of physical frames tracked by the inverted page table, including
/// the reserved frame 0. On real hardware this would be derived from
/// installed RAM at boot; fixed here since this crate has no boot stage.
pub const NUM_FRAMES: usize = 1024;

/// Fixed user stack size in pages. Matches the source's
/// `DUMBVM_STACKPAGES`: large enough that `ARG_MAX`-sized argument blocks
/// fit on first touch.
pub const STACKPAGES: usize = 18;

/// Top of the user stack (exclusive); the stack occupies
/// `[USERSTACK - STACKPAGES * PAGE_SIZE, USERSTACK)`.
pub const USERSTACK: u32 = 0x8000_0000;

/// Total size in bytes of the swap file backing store.
pub const SWAPSIZE: usize = 16 * 1024 * 1024;

/// Number of page-sized slots in the swap file.
pub const SWAP_SLOTS: usize = SWAPSIZE / PAGE_SIZE;

#[inline]
pub const fn page_align(vaddr: u32) -> u32 { vaddr & PAGE_FRAME }

#[inline]
pub const fn is_page_aligned(vaddr: u32) -> bool { vaddr & !PAGE_FRAME == 0 }
