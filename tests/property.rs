// SPDX-License-Identifier: MIT OR Apache-2.0

//! Randomized fault-sequence tests, driven
//! with a seeded `ChaCha8Rng` for reproducibility.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use swapvm::collab::test_support::{FakeElf, FakeProcesses, MemDisk};
use swapvm::{AddressSpace, FaultType, Segment, VmContext};

const PAGE_SIZE: usize = swapvm::config::PAGE_SIZE;

fn two_process_world() -> (VmContext<MemDisk, FakeElf>, FakeProcesses) {
    let code = Segment { vbase: 0x0040_0000, npages: 4, foff: 0, filesz: 4 * PAGE_SIZE as u32, memsz: 4 * PAGE_SIZE as u32 };
    let data = Segment { vbase: 0x0060_0000, npages: 4, foff: 0, filesz: 2 * PAGE_SIZE as u32, memsz: 4 * PAGE_SIZE as u32 };
    let as_ = AddressSpace::new(code, data).unwrap();

    let mut procs = FakeProcesses::new();
    procs.insert(1, as_);
    procs.insert(2, as_);
    procs.set_current(Some(1));

    // Deliberately fewer frames than the two processes' combined working
    // set, so eviction and swap-in are exercised on essentially every run.
    let ctx = VmContext::new(6, 32, 8, MemDisk::new(32), FakeElf::new(0xAA, 4 * PAGE_SIZE, 0xBB, 2 * PAGE_SIZE));
    (ctx, procs)
}

/// Every page-aligned address reachable in `two_process_world`'s address
/// space, across both processes.
fn candidate_addrs() -> Vec<u32> {
    let mut v = Vec::new();
    for base in [0x0040_0000u32, 0x0060_0000u32] {
        for i in 0..4u32 {
            v.push(base + i * PAGE_SIZE as u32);
        }
    }
    let stack_base = swapvm::config::USERSTACK - swapvm::config::STACKPAGES as u32 * PAGE_SIZE as u32;
    v.push(stack_base);
    v.push(swapvm::config::USERSTACK - PAGE_SIZE as u32);
    v
}

#[test]
fn random_fault_sequences_never_panic_and_stay_internally_consistent() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FF_EE42);
    let addrs = candidate_addrs();

    for _ in 0..20 {
        let (ctx, mut procs) = two_process_world();
        for _ in 0..300 {
            let pid = if rng.gen_bool(0.5) { 1 } else { 2 };
            procs.set_current(Some(pid));
            let vaddr = addrs[rng.gen_range(0..addrs.len())];
            let fault_type = if rng.gen_bool(0.5) { FaultType::Read } else { FaultType::Write };

            // Every outcome here is an expected one for this address
            // space: Ok, or SwapFull once the 32-slot backing store is
            // genuinely exhausted. Anything else (a panic, or a
            // surprising error kind) is the property failing.
            match ctx.fault(&procs, fault_type, vaddr) {
                Ok(()) | Err(swapvm::VmError::SwapFull) => {}
                Err(e) => panic!("unexpected fault outcome for vaddr {vaddr:#x}: {e:?}"),
            }
        }
        // Invariant: the total fault counter accounts for every resolved
        // fault (SwapFull outcomes are not counted, since they terminate
        // the faulting process rather than resolving the fault).
        let stats = ctx.stats();
        assert_eq!(stats.total, stats.resolved_free + stats.resolved_replace);
    }
}

#[test]
fn boundary_addresses_classify_consistently_under_repeated_faults() {
    let (ctx, procs) = two_process_world();
    // vbase2 and vtop2 - 1 fall in segment 2; one page past vtop2 lands in
    // neither segment nor the stack in this layout.
    let vbase2 = 0x0060_0000u32;
    let vtop2 = vbase2 + 4 * PAGE_SIZE as u32;
    assert!(ctx.fault(&procs, FaultType::Read, vbase2).is_ok());
    assert!(ctx.fault(&procs, FaultType::Read, vtop2 - PAGE_SIZE as u32).is_ok());
    assert_eq!(ctx.fault(&procs, FaultType::Read, vtop2).unwrap_err(), swapvm::VmError::EFault);
}
