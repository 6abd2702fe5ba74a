// SPDX-License-Identifier: MIT OR Apache-2.0

//! Demand-paged virtual memory core for a software-TLB educational
//! kernel: an inverted page table, a swap file, per-process address
//! spaces and a software TLB manager, composed by a single fault handler
//! (`vm_fault`).
//!
//! Hosted builds (the default, used by `cargo test`) keep `std`
//! available; a `baremetal` target (set by `build.rs`) drops it, the way
//! entry point drops it with `cfg_attr(baremetal, no_std)`.

#![cfg_attr(baremetal, no_std)]

extern crate alloc;

#[macro_use]
mod macros;

pub mod addrspace;
pub mod collab;
pub mod config;
pub mod context;
pub mod error;
pub mod fault;
pub mod global;
pub mod hashtable;
pub mod ipt;
pub mod swapfile;
pub mod tlb;
pub mod types;

pub use addrspace::{AddressSpace, Segment};
pub use collab::{BlockDevice, ElfSource, ProcessDirectory};
pub use context::{vm_tlbshootdown, VmContext};
pub use error::{VmError, VmResult};
pub use fault::{FaultStats, FaultType};
pub use types::{RawPid, SegmentId};
