//! Boundary events delivered by the external simulation clock.
//!
//! Events arrive in non-decreasing timestamp order and each is processed to
//! completion before the next one; the engine never reads wall-clock time.

use serde::Serialize;

use crate::core::vm::VirtualMachine;

#[derive(Serialize, Clone, Debug)]
pub enum CloudEvent {
    VmSubmitted { vm: VirtualMachine },
    HostStatusChanged { host_id: u32, failed: bool },
    ReconsolidationTick,
    MigrationCompleted { vm_id: u32 },
    VmCancelled { vm_id: u32 },
}
