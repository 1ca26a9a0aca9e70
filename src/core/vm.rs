//! Virtual machine entity and its lifecycle status.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::Allocation;
use crate::core::error::Error;

/// Placement lifecycle status of a VM.
///
/// `Pending -> Placed` on direct placement, `Pending -> Planning -> Placed`
/// via an accepted migration plan, `Pending -> Planning -> Deferred` when no
/// feasible plan exists (re-attempted after the retry period).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum VmStatus {
    Pending,
    Planning,
    Placed,
    Migrating,
    Deferred,
    Finished,
    Cancelled,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Pending => write!(f, "pending"),
            VmStatus::Planning => write!(f, "planning"),
            VmStatus::Placed => write!(f, "placed"),
            VmStatus::Migrating => write!(f, "migrating"),
            VmStatus::Deferred => write!(f, "deferred"),
            VmStatus::Finished => write!(f, "finished"),
            VmStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Represents a virtual machine.
///
/// A VM is characterized by a stable positive id (ordering-significant, see
/// [`crate::core::adversary`]), its resource demand in four dimensions, an
/// integer security level tag and a submission delay (time offset before the
/// VM becomes eligible for placement).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VirtualMachine {
    pub id: u32,
    /// Requested compute rate in MIPS.
    pub cpu_usage: u32,
    pub memory_usage: u64,
    pub bandwidth_usage: u64,
    pub storage_usage: u64,
    pub security_level: u32,
    pub submission_delay: f64,
    migrating: bool,
}

impl VirtualMachine {
    /// Creates a VM, validating the caller contract (positive id, finite
    /// non-negative submission delay).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        cpu_usage: u32,
        memory_usage: u64,
        bandwidth_usage: u64,
        storage_usage: u64,
        security_level: u32,
        submission_delay: f64,
    ) -> Result<Self, Error> {
        if id == 0 {
            return Err(Error::InvalidVmId(id));
        }
        if !submission_delay.is_finite() || submission_delay < 0. {
            return Err(Error::InvalidDemand(id));
        }
        Ok(Self {
            id,
            cpu_usage,
            memory_usage,
            bandwidth_usage,
            storage_usage,
            security_level,
            submission_delay,
            migrating: false,
        })
    }

    /// Returns this VM's demand as a pool allocation record.
    pub fn allocation(&self) -> Allocation {
        Allocation {
            vm_id: self.id,
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            bandwidth_usage: self.bandwidth_usage,
            storage_usage: self.storage_usage,
        }
    }

    pub fn is_migrating(&self) -> bool {
        self.migrating
    }

    pub fn set_migrating(&mut self, migrating: bool) {
        self.migrating = migrating;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_id() {
        assert_eq!(
            VirtualMachine::new(0, 1, 1, 0, 0, 0, 0.).unwrap_err(),
            Error::InvalidVmId(0)
        );
    }

    #[test]
    fn rejects_negative_delay() {
        assert_eq!(
            VirtualMachine::new(7, 1, 1, 0, 0, 0, -1.).unwrap_err(),
            Error::InvalidDemand(7)
        );
    }
}
