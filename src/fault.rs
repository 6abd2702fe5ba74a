// SPDX-License-Identifier: MIT OR Apache-2.0

//! Types shared by the fault protocol itself (`context.rs` holds the
//! protocol, since it needs every other component at once).

use crate::error::{VmError, VmResult};

/// The three fault kinds the trap handler can report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultType {
    /// A write landed on a mapping installed read-only — by construction
    /// that only happens to code pages whose dirty bit was cleared after
    /// load.
    Readonly,
    Read,
    Write,
}

impl FaultType {
    /// Decodes the raw trap-handler fault code. The trap handler hands
    /// `vm_fault` a plain integer, not a pre-validated enum, and the
    /// source's own `switch` has a `default: return EINVAL` arm for
    /// anything outside the three known codes — so this conversion is
    /// fallible rather than a plain `From`.
    pub fn from_raw(code: i32) -> VmResult<FaultType> {
        match code {
            0 => Ok(FaultType::Readonly),
            1 => Ok(FaultType::Read),
            2 => Ok(FaultType::Write),
            _ => Err(VmError::EInval),
        }
    }
}

/// Three monotonic counters kept for observability.
#[derive(Debug, Default, Copy, Clone)]
pub struct FaultStats {
    pub total: u64,
    pub resolved_free: u64,
    pub resolved_replace: u64,
}

impl FaultStats {
    pub const fn new() -> Self { FaultStats { total: 0, resolved_free: 0, resolved_replace: 0 } }

    pub fn record_free(&mut self) {
        self.total += 1;
        self.resolved_free += 1;
    }

    pub fn record_replace(&mut self) {
        self.total += 1;
        self.resolved_replace += 1;
    }
}
