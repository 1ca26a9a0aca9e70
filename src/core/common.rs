//! Common types shared by the engine components.

use serde::Serialize;

/// Resource demand of a single VM, the unit of accounting in the resource pool.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Allocation {
    pub vm_id: u32,
    /// Requested compute rate in MIPS.
    pub cpu_usage: u32,
    pub memory_usage: u64,
    pub bandwidth_usage: u64,
    pub storage_usage: u64,
}

/// Outcome of checking whether a VM may be allocated on a host.
#[derive(Clone, Debug, PartialEq)]
pub enum AllocationVerdict {
    Success,
    NotEnoughCpu,
    NotEnoughMemory,
    NotEnoughBandwidth,
    NotEnoughStorage,
    HostFailed,
    HostNotFound,
    /// A resident VM may not co-reside with the incoming VM.
    SecurityConflict,
}
