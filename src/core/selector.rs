//! Host selection for incoming VM placement requests.

use crate::core::common::AllocationVerdict;
use crate::core::monitoring::Monitoring;
use crate::core::resource_pool::ResourcePoolState;
use crate::core::strategy::PlacementStrategy;
use crate::core::vm::VirtualMachine;
use crate::core::vm_registry::VmRegistry;

/// Chooses the best legal host for an incoming VM using the injected
/// strategy. Stateless across calls: scores live in a transient per-pass
/// ranking, never on the VM or host entities.
pub struct PlacementSelector {
    strategy: Box<dyn PlacementStrategy>,
}

impl PlacementSelector {
    pub fn new(strategy: Box<dyn PlacementStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &dyn PlacementStrategy {
        self.strategy.as_ref()
    }

    /// Full suitability check of a single host: resource capacity, failed
    /// status and co-residency legality against every resident VM.
    pub fn suitability(
        &self,
        vm: &VirtualMachine,
        pool: &ResourcePoolState,
        registry: &VmRegistry,
        host_id: u32,
    ) -> AllocationVerdict {
        let verdict = pool.can_allocate(&vm.allocation(), host_id);
        if verdict != AllocationVerdict::Success {
            return verdict;
        }
        for resident_id in pool.resident_vms(host_id) {
            if let Some(resident) = registry.get(resident_id) {
                if !self.strategy.is_legal(vm, resident) {
                    return AllocationVerdict::SecurityConflict;
                }
            }
        }
        AllocationVerdict::Success
    }

    /// Returns the best legal host for `vm`, or `None` when no host qualifies
    /// (the caller is expected to fall back to migration planning).
    ///
    /// One surviving candidate is returned directly without scoring; several
    /// are ranked by the strategy's placement score, ties broken by host
    /// insertion order (lowest id wins).
    pub fn select_host(
        &self,
        vm: &VirtualMachine,
        pool: &ResourcePoolState,
        monitoring: &Monitoring,
        registry: &VmRegistry,
        exclude: Option<u32>,
    ) -> Option<u32> {
        let mut legal = Vec::new();
        for host_id in pool.host_ids() {
            if exclude == Some(host_id) {
                continue;
            }
            if self.suitability(vm, pool, registry, host_id) == AllocationVerdict::Success {
                legal.push(host_id);
            }
        }
        if legal.len() <= 1 {
            return legal.first().copied();
        }

        let mut best: Option<(u32, f64)> = None;
        for host_id in legal {
            let host = match pool.host(host_id) {
                Ok(host) => host,
                Err(_) => continue,
            };
            let util = monitoring.snapshot(host_id, host);
            let score = self.strategy.placement_score(vm, host, &util);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((host_id, score));
            }
        }
        best.map(|(host_id, _)| host_id)
    }
}
