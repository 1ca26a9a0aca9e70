//! Security-aware placement of Afoulki, Bousquet and Rouzaud-Cornabas.
//!
//! Legality is the pairwise adversary predicate. Placement prefers hosts with
//! few VMs (resident or migrating in) and much free capacity; migration
//! targets are ranked by the number of hostile VMs and users they carry plus
//! their current utilization.

use crate::core::adversary::is_adversary;
use crate::core::monitoring::HostState;
use crate::core::resource_pool::HostInfo;
use crate::core::strategy::{PlacementStrategy, MUST_EVICT};
use crate::core::vm::VirtualMachine;

#[derive(Clone, Default)]
pub struct SecurityAware;

impl SecurityAware {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementStrategy for SecurityAware {
    fn is_legal(&self, vm: &VirtualMachine, resident: &VirtualMachine) -> bool {
        !is_adversary(vm.id, resident.id)
    }

    fn placement_score(&self, _vm: &VirtualMachine, host: &HostInfo, util: &HostState) -> f64 {
        let free_ram = (1. - util.memory_load).clamp(0., 1.);
        let free_cpu = (1. - util.cpu_load).clamp(0., 1.);
        let vm_count = host.allocations.len() + host.migrating_in as usize + 1;
        (free_ram + free_cpu) / vm_count as f64
    }

    fn host_migration_score(&self, vm: &VirtualMachine, residents: &[VirtualMachine], util: &HostState) -> f64 {
        let mut hostile_vms: u32 = 0;
        for resident in residents {
            if resident.id == 1 {
                // The universal adversary can never be co-resident with anyone.
                return f64::MAX;
            }
            if is_adversary(vm.id, resident.id) {
                hostile_vms += 1;
            }
        }
        // One VM per user in this model, so hostile users mirror hostile VMs.
        let hostile_users = hostile_vms;
        let resources = util.cpu_load.clamp(0., 1.) + util.memory_load.clamp(0., 1.);
        (hostile_vms + hostile_users + 1) as f64 * resources / 2.
    }

    fn eviction_score(&self, vm: &VirtualMachine, resident: &VirtualMachine) -> i64 {
        if is_adversary(vm.id, resident.id) {
            return MUST_EVICT;
        }
        // Larger VMs sort later: prefer evicting small, cheap-to-move ones.
        resident.memory_usage as i64 + resident.cpu_usage as i64
    }
}
