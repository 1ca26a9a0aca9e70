//! Registry of VM records and their lifecycle statuses.

use std::collections::BTreeMap;

use crate::core::error::Error;
use crate::core::vm::{VirtualMachine, VmStatus};

/// Holds one record per submitted VM. The placement engine references VMs by
/// id; the records here are the engine's view of broker-owned objects.
#[derive(Default)]
pub struct VmRegistry {
    vms: BTreeMap<u32, VirtualMachine>,
    statuses: BTreeMap<u32, VmStatus>,
}

impl VmRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a newly submitted VM with `Pending` status.
    pub fn register(&mut self, vm: VirtualMachine) -> Result<(), Error> {
        if vm.id == 0 {
            return Err(Error::InvalidVmId(vm.id));
        }
        if self.vms.contains_key(&vm.id) {
            return Err(Error::DuplicateVmId(vm.id));
        }
        self.statuses.insert(vm.id, VmStatus::Pending);
        self.vms.insert(vm.id, vm);
        Ok(())
    }

    pub fn get(&self, vm_id: u32) -> Option<&VirtualMachine> {
        self.vms.get(&vm_id)
    }

    pub fn status(&self, vm_id: u32) -> Option<&VmStatus> {
        self.statuses.get(&vm_id)
    }

    pub fn set_status(&mut self, vm_id: u32, status: VmStatus) -> Result<(), Error> {
        if !self.vms.contains_key(&vm_id) {
            return Err(Error::VmNotFound(vm_id));
        }
        self.statuses.insert(vm_id, status);
        Ok(())
    }

    pub fn set_migrating(&mut self, vm_id: u32, migrating: bool) -> Result<(), Error> {
        let vm = self.vms.get_mut(&vm_id).ok_or(Error::VmNotFound(vm_id))?;
        vm.set_migrating(migrating);
        Ok(())
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }
}
