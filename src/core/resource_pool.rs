//! Resource pool state.

use std::collections::BTreeMap;

use crate::core::common::{Allocation, AllocationVerdict};
use crate::core::error::Error;

/// Stores host properties (fixed capacity) and state (available resources,
/// failed flag, current allocations).
///
/// Capacity invariant: the sum of resident allocations never exceeds the host
/// capacity in any dimension once committed; there is no overcommit path.
#[derive(Clone, Debug, PartialEq)]
pub struct HostInfo {
    /// Compute rate of each independent processing element in MIPS.
    pub pe_mips: Vec<u32>,
    pub cpu_total: u32,
    pub memory_total: u64,
    pub bandwidth_total: u64,
    pub storage_total: u64,

    pub cpu_available: u32,
    pub memory_available: u64,
    pub bandwidth_available: u64,
    pub storage_available: u64,

    pub failed: bool,
    /// Number of VMs currently reserving capacity while migrating in.
    pub migrating_in: u32,

    pub allocations: BTreeMap<u32, Allocation>,
}

impl HostInfo {
    fn new(pe_mips: Vec<u32>, memory_total: u64, bandwidth_total: u64, storage_total: u64) -> Self {
        let cpu_total: u32 = pe_mips.iter().sum();
        Self {
            pe_mips,
            cpu_total,
            memory_total,
            bandwidth_total,
            storage_total,
            cpu_available: cpu_total,
            memory_available: memory_total,
            bandwidth_available: bandwidth_total,
            storage_available: storage_total,
            failed: false,
            migrating_in: 0,
            allocations: BTreeMap::new(),
        }
    }
}

/// Authoritative allocation state of all hosts.
///
/// Cloneable by design: the migration planner works against checkpointed
/// copies (see [`crate::core::transaction`]) and `PartialEq` makes rollback
/// correctness directly checkable.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ResourcePoolState {
    hosts: BTreeMap<u32, HostInfo>,
}

impl ResourcePoolState {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a host with the given per-PE compute rates and capacities.
    pub fn add_host(
        &mut self,
        id: u32,
        pe_mips: Vec<u32>,
        memory_total: u64,
        bandwidth_total: u64,
        storage_total: u64,
    ) -> Result<(), Error> {
        if id == 0 {
            return Err(Error::InvalidHostId(id));
        }
        if pe_mips.is_empty() || pe_mips.contains(&0) {
            return Err(Error::InvalidCapacity(id));
        }
        if self.hosts.contains_key(&id) {
            return Err(Error::DuplicateHostId(id));
        }
        self.hosts
            .insert(id, HostInfo::new(pe_mips, memory_total, bandwidth_total, storage_total));
        Ok(())
    }

    pub fn host(&self, id: u32) -> Result<&HostInfo, Error> {
        self.hosts.get(&id).ok_or(Error::HostNotFound(id))
    }

    /// Returns ids of all hosts in insertion (id) order.
    pub fn host_ids(&self) -> Vec<u32> {
        self.hosts.keys().cloned().collect()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Checks if the specified allocation currently fits on the specified host.
    pub fn can_allocate(&self, alloc: &Allocation, host_id: u32) -> AllocationVerdict {
        let host = match self.hosts.get(&host_id) {
            Some(host) => host,
            None => return AllocationVerdict::HostNotFound,
        };
        if host.failed {
            return AllocationVerdict::HostFailed;
        }
        if host.cpu_available < alloc.cpu_usage {
            return AllocationVerdict::NotEnoughCpu;
        }
        if host.memory_available < alloc.memory_usage {
            return AllocationVerdict::NotEnoughMemory;
        }
        if host.bandwidth_available < alloc.bandwidth_usage {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        if host.storage_available < alloc.storage_usage {
            return AllocationVerdict::NotEnoughStorage;
        }
        AllocationVerdict::Success
    }

    /// Applies the allocation on the host if it fits; returns the verdict.
    /// Allocating a VM twice on the same host is a no-op.
    pub fn allocate(&mut self, alloc: &Allocation, host_id: u32) -> AllocationVerdict {
        if let Some(host) = self.hosts.get(&host_id) {
            if host.allocations.contains_key(&alloc.vm_id) {
                return AllocationVerdict::Success;
            }
        }
        let verdict = self.can_allocate(alloc, host_id);
        if verdict != AllocationVerdict::Success {
            return verdict;
        }
        if let Some(host) = self.hosts.get_mut(&host_id) {
            host.cpu_available -= alloc.cpu_usage;
            host.memory_available -= alloc.memory_usage;
            host.bandwidth_available -= alloc.bandwidth_usage;
            host.storage_available -= alloc.storage_usage;
            host.allocations.insert(alloc.vm_id, alloc.clone());
        }
        AllocationVerdict::Success
    }

    /// Removes the VM's allocation from the host, returning it if present.
    pub fn release(&mut self, vm_id: u32, host_id: u32) -> Option<Allocation> {
        let host = self.hosts.get_mut(&host_id)?;
        let alloc = host.allocations.remove(&vm_id)?;
        host.cpu_available += alloc.cpu_usage;
        host.memory_available += alloc.memory_usage;
        host.bandwidth_available += alloc.bandwidth_usage;
        host.storage_available += alloc.storage_usage;
        Some(alloc)
    }

    pub fn set_host_failed(&mut self, host_id: u32, failed: bool) -> Result<(), Error> {
        let host = self.hosts.get_mut(&host_id).ok_or(Error::HostNotFound(host_id))?;
        host.failed = failed;
        Ok(())
    }

    pub fn inc_migrating_in(&mut self, host_id: u32) {
        if let Some(host) = self.hosts.get_mut(&host_id) {
            host.migrating_in += 1;
        }
    }

    pub fn dec_migrating_in(&mut self, host_id: u32) {
        if let Some(host) = self.hosts.get_mut(&host_id) {
            host.migrating_in = host.migrating_in.saturating_sub(1);
        }
    }

    /// Returns ids of VMs currently allocated on the host.
    pub fn resident_vms(&self, host_id: u32) -> Vec<u32> {
        self.hosts
            .get(&host_id)
            .map(|host| host.allocations.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the CPU and memory allocation rates the host would have with
    /// `alloc` hypothetically added.
    pub fn allocation_rates_after(&self, host_id: u32, alloc: &Allocation) -> (f64, f64) {
        let host = &self.hosts[&host_id];
        let cpu_allocated = (host.cpu_total - host.cpu_available) as f64 + alloc.cpu_usage as f64;
        let memory_allocated = (host.memory_total - host.memory_available) as f64 + alloc.memory_usage as f64;
        (
            cpu_allocated / host.cpu_total as f64,
            memory_allocated / host.memory_total as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(vm_id: u32, cpu: u32, memory: u64) -> Allocation {
        Allocation {
            vm_id,
            cpu_usage: cpu,
            memory_usage: memory,
            bandwidth_usage: 0,
            storage_usage: 0,
        }
    }

    #[test]
    fn allocate_and_release_roundtrip() {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, vec![4, 4], 1024, 100, 1000).unwrap();
        let before = pool.clone();

        assert_eq!(pool.allocate(&alloc(7, 4, 512), 1), AllocationVerdict::Success);
        assert_eq!(pool.host(1).unwrap().cpu_available, 4);
        assert_eq!(pool.resident_vms(1), vec![7]);

        pool.release(7, 1);
        assert_eq!(pool, before);
    }

    #[test]
    fn verdicts_per_dimension() {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, vec![8], 1024, 100, 1000).unwrap();
        assert_eq!(pool.can_allocate(&alloc(2, 9, 0), 1), AllocationVerdict::NotEnoughCpu);
        assert_eq!(
            pool.can_allocate(&alloc(2, 1, 2048), 1),
            AllocationVerdict::NotEnoughMemory
        );
        let mut big_bw = alloc(2, 1, 1);
        big_bw.bandwidth_usage = 200;
        assert_eq!(pool.can_allocate(&big_bw, 1), AllocationVerdict::NotEnoughBandwidth);
        let mut big_storage = alloc(2, 1, 1);
        big_storage.storage_usage = 2000;
        assert_eq!(pool.can_allocate(&big_storage, 1), AllocationVerdict::NotEnoughStorage);
        assert_eq!(pool.can_allocate(&alloc(2, 1, 1), 2), AllocationVerdict::HostNotFound);
    }

    #[test]
    fn failed_host_rejects_allocations() {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, vec![8], 1024, 100, 1000).unwrap();
        pool.set_host_failed(1, true).unwrap();
        assert_eq!(pool.can_allocate(&alloc(2, 1, 1), 1), AllocationVerdict::HostFailed);
    }

    #[test]
    fn rejects_bad_host_definitions() {
        let mut pool = ResourcePoolState::new();
        assert_eq!(
            pool.add_host(0, vec![8], 1, 1, 1).unwrap_err(),
            Error::InvalidHostId(0)
        );
        assert_eq!(
            pool.add_host(1, vec![], 1, 1, 1).unwrap_err(),
            Error::InvalidCapacity(1)
        );
        pool.add_host(1, vec![8], 1, 1, 1).unwrap();
        assert_eq!(
            pool.add_host(1, vec![8], 1, 1, 1).unwrap_err(),
            Error::DuplicateHostId(1)
        );
    }

    #[test]
    fn hypothetical_rates() {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, vec![10], 100, 100, 100).unwrap();
        pool.allocate(&alloc(3, 2, 20), 1);
        let (cpu, memory) = pool.allocation_rates_after(1, &alloc(6, 8, 30));
        assert_eq!(cpu, 1.0);
        assert_eq!(memory, 0.5);
    }
}
