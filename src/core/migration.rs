//! Migration-based consolidation planner.
//!
//! Invoked when the selector found no host that can directly accept an
//! incoming VM. The planner looks for a host that could be made legal by
//! evicting the VMs hostile to the incoming one, relocates those evictees in
//! a checkpointed copy of the pool state and accepts the plan only if every
//! evictee found a destination and the target stays under the
//! over-utilization threshold. The real pool state is restored either way;
//! committing an accepted plan is the scheduler's job.

use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::common::AllocationVerdict;
use crate::core::error::Error;
use crate::core::monitoring::Monitoring;
use crate::core::resource_pool::ResourcePoolState;
use crate::core::selector::PlacementSelector;
use crate::core::strategy::MUST_EVICT;
use crate::core::transaction::TransactionLog;
use crate::core::vm::VirtualMachine;
use crate::core::vm_registry::VmRegistry;

/// Accepted consolidation plan: admit `incoming_vm` on `target_host` once
/// every relocation in `relocations` (vm id -> destination host) completes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MigrationPlan {
    pub incoming_vm: u32,
    pub target_host: u32,
    pub relocations: IndexMap<u32, u32>,
}

impl Display for MigrationPlan {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "admit vm {} on host {}", self.incoming_vm, self.target_host)?;
        for (vm_id, host_id) in &self.relocations {
            write!(f, ", relocate vm {} to host {}", vm_id, host_id)?;
        }
        Ok(())
    }
}

pub struct MigrationPlanner {
    overutilization_threshold: f64,
}

impl MigrationPlanner {
    pub fn new(overutilization_threshold: f64) -> Self {
        Self {
            overutilization_threshold,
        }
    }

    /// Searches for a feasible eviction-based plan for `vm`.
    ///
    /// Returns `Ok(Some(plan))` when a plan was found, `Ok(None)` when no
    /// candidate host or no feasible relocation set exists (the VM should be
    /// deferred), and `Err` on an internal invariant violation (the pool is
    /// restored before the error propagates).
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        &self,
        vm: &VirtualMachine,
        selector: &PlacementSelector,
        pool: &mut ResourcePoolState,
        tx_log: &mut TransactionLog,
        monitoring: &Monitoring,
        registry: &VmRegistry,
        current_host: Option<u32>,
    ) -> Result<Option<MigrationPlan>, Error> {
        let target_host = match self.pick_target(vm, selector, pool, monitoring, registry, current_host) {
            Some(host_id) => host_id,
            None => return Ok(None),
        };

        let token = tx_log.checkpoint(pool);
        let outcome = self.simulate(vm, target_host, selector, pool, monitoring, registry);
        tx_log.restore(token, pool)?;

        Ok(outcome?.map(|relocations| MigrationPlan {
            incoming_vm: vm.id,
            target_host,
            relocations,
        }))
    }

    /// Picks the host that is safest to clear for `vm`: argmin of the
    /// strategy's migration score over hosts that are not failed, have enough
    /// free capacity, would not cross the over-utilization threshold and are
    /// not the VM's current host. Hosts whose score is the "never choose"
    /// sentinel are excluded outright.
    fn pick_target(
        &self,
        vm: &VirtualMachine,
        selector: &PlacementSelector,
        pool: &ResourcePoolState,
        monitoring: &Monitoring,
        registry: &VmRegistry,
        current_host: Option<u32>,
    ) -> Option<u32> {
        let alloc = vm.allocation();
        let mut best: Option<(u32, f64)> = None;
        for host_id in pool.host_ids() {
            if current_host == Some(host_id) {
                continue;
            }
            if pool.can_allocate(&alloc, host_id) != AllocationVerdict::Success {
                continue;
            }
            if self.overloaded_after(pool, host_id, vm) {
                continue;
            }
            let host = match pool.host(host_id) {
                Ok(host) => host,
                Err(_) => continue,
            };
            let residents: Vec<VirtualMachine> = pool
                .resident_vms(host_id)
                .into_iter()
                .filter_map(|id| registry.get(id).cloned())
                .collect();
            let util = monitoring.snapshot(host_id, host);
            let score = selector.strategy().host_migration_score(vm, &residents, &util);
            if score == f64::MAX {
                continue;
            }
            if best.map_or(true, |(_, top)| score < top) {
                best = Some((host_id, score));
            }
        }
        best.map(|(host_id, _)| host_id)
    }

    fn overloaded_after(&self, pool: &ResourcePoolState, host_id: u32, vm: &VirtualMachine) -> bool {
        let (cpu, memory) = pool.allocation_rates_after(host_id, &vm.allocation());
        cpu > self.overutilization_threshold || memory > self.overutilization_threshold
    }

    /// Builds the relocation set against the speculative pool state. The
    /// caller restores the pool afterwards regardless of the outcome.
    fn simulate(
        &self,
        vm: &VirtualMachine,
        target_host: u32,
        selector: &PlacementSelector,
        pool: &mut ResourcePoolState,
        monitoring: &Monitoring,
        registry: &VmRegistry,
    ) -> Result<Option<IndexMap<u32, u32>>, Error> {
        let residents = pool.resident_vms(target_host);
        if residents.is_empty() {
            // Nothing blocks the host; trivial plan with no relocations.
            return Ok(Some(IndexMap::new()));
        }

        let mut scored: Vec<(i64, u32)> = Vec::with_capacity(residents.len());
        for resident_id in residents {
            if resident_id == vm.id {
                return Err(Error::PlanInvariantViolated(format!(
                    "incoming vm {} is already resident on host {}",
                    vm.id, target_host
                )));
            }
            let resident = registry.get(resident_id).ok_or(Error::VmNotFound(resident_id))?;
            scored.push((selector.strategy().eviction_score(vm, resident), resident_id));
        }
        scored.sort_by_key(|(score, _)| *score);

        let eviction_set: Vec<u32> = scored
            .iter()
            .take_while(|(score, _)| *score == MUST_EVICT)
            .map(|(_, vm_id)| *vm_id)
            .collect();
        if eviction_set.is_empty() {
            // The host was not blocked by hostile VMs, so eviction cannot help.
            return Ok(None);
        }
        for &evictee_id in &eviction_set {
            let evictee = registry.get(evictee_id).ok_or(Error::VmNotFound(evictee_id))?;
            // An in-flight VM cannot be evicted again: its source allocation
            // and destination reservation stay intact until its migration
            // completes, so the host is not clearable right now.
            if evictee.is_migrating() {
                return Ok(None);
            }
        }

        let mut relocations = IndexMap::with_capacity(eviction_set.len());
        for evictee_id in eviction_set {
            let evictee = registry.get(evictee_id).ok_or(Error::VmNotFound(evictee_id))?.clone();
            pool.release(evictee_id, target_host);
            let destination = match selector.select_host(&evictee, pool, monitoring, registry, Some(target_host)) {
                Some(host_id) => host_id,
                None => return Ok(None),
            };
            if destination == target_host {
                return Err(Error::PlanInvariantViolated(format!(
                    "relocation of vm {} targets its own source host {}",
                    evictee_id, target_host
                )));
            }
            pool.allocate(&evictee.allocation(), destination);
            relocations.insert(evictee_id, destination);
        }

        if pool.can_allocate(&vm.allocation(), target_host) != AllocationVerdict::Success
            || self.overloaded_after(pool, target_host, vm)
        {
            return Ok(None);
        }
        Ok(Some(relocations))
    }
}
