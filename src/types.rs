// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small newtypes shared across modules. Kept separate from `config.rs`
//! (constants) and from the component modules (behavior) so that every
//! component agrees on one vocabulary for "process", "frame" and "slot".

use core::fmt;

/// A process identifier. The spec's `pid_t` is a plain signed integer with
/// `-1` reserved as a sentinel; `RawPid` keeps that shape instead of
/// wrapping it in `Option`, matching how the source itself represents an
/// absent process.
pub type RawPid = i64;

/// Physical frame number. Frame 0 is reserved: `ipt_lookup` returns it to
/// mean "not resident", matching the spec's "0 is a reserved non-user
/// frame."
pub type Frame = u32;

/// Index into the swap file's slot table.
pub type SwapSlot = u32;

/// Which segment of an address space an address belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SegmentId {
    /// Read-only code, backed by the ELF image, discarded rather than
    /// written to swap.
    Code,
    /// Read-write data, backed by the ELF image on first touch.
    Data,
    /// Read-write stack, zero-filled on first touch.
    Stack,
}

/// A `(pid, vaddr)` pair. `HashTable` represents an empty slot with its own
/// `Slot::Empty` variant rather than a `(-1, -1)` sentinel `Key`, so unlike
/// the spec's literal description there is no reserved `Key` value here.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Key {
    pub pid: RawPid,
    pub vaddr: u32,
}

impl Key {
    pub fn new(pid: RawPid, vaddr: u32) -> Self { Key { pid, vaddr } }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(pid={}, vaddr={:#010x})", self.pid, self.vaddr)
    }
}
