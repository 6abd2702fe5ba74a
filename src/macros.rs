// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trace macros for the fault path, compiled out entirely unless the
//! owning feature is on, so there is zero runtime cost in a default
//! build.

/// Trace a fault-handling decision. No-op unless built with `debug-vm`.
#[macro_export]
macro_rules! debug_vm {
    ($($args:tt)+) => {
        #[cfg(all(feature = "debug-vm", not(baremetal)))]
        {
            std::eprintln!($($args)+);
        }
    };
}

/// Trace per-step detail (TLB scans, victim cursor steps). No-op unless
/// built with `debug-vm-verbose`.
#[macro_export]
macro_rules! debug_vm_verbose {
    ($($args:tt)+) => {
        #[cfg(all(feature = "debug-vm-verbose", not(baremetal)))]
        {
            std::eprintln!($($args)+);
        }
    };
}
