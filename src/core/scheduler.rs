//! Placement scheduler.
//!
//! Owns the authoritative pool state and drives the two-phase placement flow:
//! direct selection first, migration planning second, deferral last. All pool
//! mutations happen here; the selector and the planner only read (the planner
//! speculates on checkpointed state and always restores it).

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use log::Level;
use serde::Serialize;

use crate::core::common::AllocationVerdict;
use crate::core::config::SimConfig;
use crate::core::contracts::{Broker, MigrationExecutor};
use crate::core::error::Error;
use crate::core::logger::Logger;
use crate::core::migration::{MigrationPlan, MigrationPlanner};
use crate::core::monitoring::Monitoring;
use crate::core::resource_pool::ResourcePoolState;
use crate::core::selector::PlacementSelector;
use crate::core::transaction::TransactionLog;
use crate::core::vm::{VirtualMachine, VmStatus};
use crate::core::vm_registry::VmRegistry;

/// Outcome of a placement attempt, reported back to the event source.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PlacementDecision {
    Placed { host_id: u32 },
    MigrationPlanned { plan: MigrationPlan },
    Deferred { retry_at: f64 },
}

/// Run counters, dumped at the end of an experiment.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub direct_placements: u64,
    pub planned_admissions: u64,
    pub migrations_planned: u64,
    pub migrations_completed: u64,
    pub deferrals: u64,
    pub rejected_plans: u64,
    pub internal_faults: u64,
    pub host_failures: u64,
    pub cancelled_vms: u64,
}

struct DeferredVm {
    vm_id: u32,
    retry_at: f64,
}

/// Relocation committed but not yet finished by the migration executor.
/// The VM keeps its source allocation and reserves the destination until
/// completion, so neither side can be double-booked in the meantime.
struct PendingMigration {
    source_host: u32,
    destination_host: u32,
    plan_owner: Option<u32>,
}

/// Committed plan whose owner VM waits for the listed relocations to finish.
struct InFlightPlan {
    target_host: u32,
    outstanding: BTreeSet<u32>,
}

pub struct Scheduler {
    pool: ResourcePoolState,
    tx_log: TransactionLog,
    selector: PlacementSelector,
    planner: MigrationPlanner,
    registry: Rc<RefCell<VmRegistry>>,
    monitoring: Rc<RefCell<Monitoring>>,
    logger: Rc<RefCell<Box<dyn Logger>>>,
    executor: Box<dyn MigrationExecutor>,
    broker: Box<dyn Broker>,
    config: Rc<SimConfig>,
    deferred: VecDeque<DeferredVm>,
    pending_migrations: BTreeMap<u32, PendingMigration>,
    in_flight_plans: BTreeMap<u32, InFlightPlan>,
    placements: BTreeMap<u32, u32>,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(
        selector: PlacementSelector,
        planner: MigrationPlanner,
        registry: Rc<RefCell<VmRegistry>>,
        monitoring: Rc<RefCell<Monitoring>>,
        logger: Rc<RefCell<Box<dyn Logger>>>,
        executor: Box<dyn MigrationExecutor>,
        broker: Box<dyn Broker>,
        config: Rc<SimConfig>,
    ) -> Self {
        Self {
            pool: ResourcePoolState::new(),
            tx_log: TransactionLog::new(),
            selector,
            planner,
            registry,
            monitoring,
            logger,
            executor,
            broker,
            config,
            deferred: VecDeque::new(),
            pending_migrations: BTreeMap::new(),
            in_flight_plans: BTreeMap::new(),
            placements: BTreeMap::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn add_host(
        &mut self,
        id: u32,
        pe_mips: Vec<u32>,
        memory: u64,
        bandwidth: u64,
        storage: u64,
    ) -> Result<(), Error> {
        self.pool.add_host(id, pe_mips, memory, bandwidth, storage)?;
        let host = self.pool.host(id)?;
        self.monitoring
            .borrow_mut()
            .add_host(id, host.cpu_total, host.memory_total);
        Ok(())
    }

    pub fn pool(&self) -> &ResourcePoolState {
        &self.pool
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn placement_of(&self, vm_id: u32) -> Option<u32> {
        self.placements.get(&vm_id).copied()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Registers the submitted VM and runs a placement attempt.
    pub fn on_vm_submitted(&mut self, vm: VirtualMachine, time: f64) -> Result<PlacementDecision, Error> {
        let vm_id = vm.id;
        self.registry.borrow_mut().register(vm)?;
        self.try_place(vm_id, time)
    }

    /// Attempts to place the VM: direct selection, then migration planning,
    /// then deferral. Planner faults are contained: the VM is deferred and
    /// the fault is counted instead of poisoning the event loop.
    pub fn try_place(&mut self, vm_id: u32, time: f64) -> Result<PlacementDecision, Error> {
        let vm = self
            .registry
            .borrow()
            .get(vm_id)
            .cloned()
            .ok_or(Error::VmNotFound(vm_id))?;

        let selected = {
            let registry = self.registry.borrow();
            let monitoring = self.monitoring.borrow();
            self.selector.select_host(&vm, &self.pool, &monitoring, &registry, None)
        };
        if let Some(host_id) = selected {
            return self.commit_direct(&vm, host_id, time);
        }

        self.registry.borrow_mut().set_status(vm_id, VmStatus::Planning)?;
        let plan_result = {
            let registry = self.registry.borrow();
            let monitoring = self.monitoring.borrow();
            self.planner.plan(
                &vm,
                &self.selector,
                &mut self.pool,
                &mut self.tx_log,
                &monitoring,
                &registry,
                None,
            )
        };
        match plan_result {
            Ok(Some(plan)) => self.commit_plan(&vm, plan, time),
            Ok(None) => {
                self.stats.rejected_plans += 1;
                self.log(
                    Level::Info,
                    time,
                    format!("no feasible migration plan for vm {}", vm_id),
                );
                self.defer(vm_id, time)
            }
            Err(err) => {
                self.stats.internal_faults += 1;
                self.log(Level::Error, time, format!("planner fault for vm {}: {}", vm_id, err));
                self.defer(vm_id, time)
            }
        }
    }

    fn commit_direct(&mut self, vm: &VirtualMachine, host_id: u32, time: f64) -> Result<PlacementDecision, Error> {
        let verdict = self.pool.allocate(&vm.allocation(), host_id);
        if verdict != AllocationVerdict::Success {
            self.stats.internal_faults += 1;
            self.log(
                Level::Error,
                time,
                format!("allocation of vm {} on selected host {} failed: {:?}", vm.id, host_id, verdict),
            );
            return self.defer(vm.id, time);
        }
        self.registry.borrow_mut().set_status(vm.id, VmStatus::Placed)?;
        self.placements.insert(vm.id, host_id);
        self.stats.direct_placements += 1;
        self.log(Level::Info, time, format!("vm {} placed on host {}", vm.id, host_id));
        Ok(PlacementDecision::Placed { host_id })
    }

    /// Commits an accepted plan: reserves destination-side resources for each
    /// evictee under a checkpoint, then hands the relocations to the executor.
    /// The incoming VM is admitted only when the last relocation completes.
    fn commit_plan(&mut self, vm: &VirtualMachine, plan: MigrationPlan, time: f64) -> Result<PlacementDecision, Error> {
        if plan.relocations.is_empty() {
            return self.commit_direct(vm, plan.target_host, time);
        }

        let token = self.tx_log.checkpoint(&self.pool);
        if let Err(err) = self.reserve_relocations(&plan) {
            self.tx_log.restore(token, &mut self.pool)?;
            self.stats.internal_faults += 1;
            self.log(Level::Error, time, format!("plan for vm {} rejected at commit: {}", vm.id, err));
            return self.defer(vm.id, time);
        }
        self.tx_log.commit(token)?;

        let mut outstanding = BTreeSet::new();
        for (&evictee_id, &destination) in &plan.relocations {
            {
                let mut registry = self.registry.borrow_mut();
                registry.set_status(evictee_id, VmStatus::Migrating)?;
                registry.set_migrating(evictee_id, true)?;
            }
            self.pending_migrations.insert(
                evictee_id,
                PendingMigration {
                    source_host: plan.target_host,
                    destination_host: destination,
                    plan_owner: Some(vm.id),
                },
            );
            self.executor.request_migration(evictee_id, plan.target_host, destination);
            outstanding.insert(evictee_id);
            self.stats.migrations_planned += 1;
        }
        self.in_flight_plans.insert(
            vm.id,
            InFlightPlan {
                target_host: plan.target_host,
                outstanding,
            },
        );
        self.log(Level::Info, time, format!("committed plan: {}", plan));
        Ok(PlacementDecision::MigrationPlanned { plan })
    }

    /// Applies destination-side reservations for every relocation of the
    /// plan. Each evictee stays allocated on its source host and additionally
    /// holds its destination capacity until the migration completes.
    fn reserve_relocations(&mut self, plan: &MigrationPlan) -> Result<(), Error> {
        for (&evictee_id, &destination) in &plan.relocations {
            // One pending migration per VM; a second would overwrite the
            // record and orphan the first destination's reservation.
            if self.pending_migrations.contains_key(&evictee_id) {
                return Err(Error::PlanInvariantViolated(format!(
                    "vm {} already has a migration in flight",
                    evictee_id
                )));
            }
            let alloc = self
                .registry
                .borrow()
                .get(evictee_id)
                .ok_or(Error::VmNotFound(evictee_id))?
                .allocation();
            let verdict = self.pool.allocate(&alloc, destination);
            if verdict != AllocationVerdict::Success {
                return Err(Error::PlanInvariantViolated(format!(
                    "reservation of vm {} on host {} failed: {:?}",
                    evictee_id, destination, verdict
                )));
            }
            self.pool.inc_migrating_in(destination);
        }
        Ok(())
    }

    /// Finalizes a completed relocation: frees the source-side resources,
    /// drops the destination reservation marker and, if this was the last
    /// outstanding relocation of a plan, admits the plan's owner VM.
    ///
    /// Returns the owner's placement decision when one was produced.
    pub fn on_migration_completed(&mut self, vm_id: u32, time: f64) -> Result<Option<(u32, PlacementDecision)>, Error> {
        let pending = match self.pending_migrations.remove(&vm_id) {
            Some(pending) => pending,
            None => {
                self.log(Level::Warn, time, format!("unexpected migration completion for vm {}", vm_id));
                return Ok(None);
            }
        };
        self.pool.release(vm_id, pending.source_host);
        self.pool.dec_migrating_in(pending.destination_host);
        {
            let mut registry = self.registry.borrow_mut();
            registry.set_migrating(vm_id, false)?;
            registry.set_status(vm_id, VmStatus::Placed)?;
        }
        self.placements.insert(vm_id, pending.destination_host);
        self.stats.migrations_completed += 1;
        self.log(
            Level::Info,
            time,
            format!(
                "vm {} migrated from host {} to host {}",
                vm_id, pending.source_host, pending.destination_host
            ),
        );

        if let Some(owner) = pending.plan_owner {
            let plan_done = match self.in_flight_plans.get_mut(&owner) {
                Some(plan) => {
                    plan.outstanding.remove(&vm_id);
                    plan.outstanding.is_empty()
                }
                None => false,
            };
            if plan_done {
                let plan = self.in_flight_plans.remove(&owner).ok_or(Error::VmNotFound(owner))?;
                let decision = self.try_admit_owner(owner, plan.target_host, time)?;
                return Ok(Some((owner, decision)));
            }
        }
        Ok(None)
    }

    /// Admits a plan owner after its last relocation finished. The target is
    /// re-checked; concurrent events may have consumed it in the meantime.
    fn try_admit_owner(&mut self, owner: u32, target_host: u32, time: f64) -> Result<PlacementDecision, Error> {
        let vm = self
            .registry
            .borrow()
            .get(owner)
            .cloned()
            .ok_or(Error::VmNotFound(owner))?;
        let verdict = {
            let registry = self.registry.borrow();
            self.selector.suitability(&vm, &self.pool, &registry, target_host)
        };
        if verdict != AllocationVerdict::Success {
            self.stats.internal_faults += 1;
            self.log(
                Level::Error,
                time,
                format!("admission of vm {} on host {} failed: {:?}", owner, target_host, verdict),
            );
            return self.defer(owner, time);
        }
        self.pool.allocate(&vm.allocation(), target_host);
        self.registry.borrow_mut().set_status(owner, VmStatus::Placed)?;
        self.placements.insert(owner, target_host);
        self.stats.planned_admissions += 1;
        self.log(Level::Info, time, format!("vm {} admitted on host {}", owner, target_host));
        Ok(PlacementDecision::Placed { host_id: target_host })
    }

    /// Handles a host status change. On failure, aborts the reservations and
    /// plans touching the host and requeues its resident VMs (except the ones
    /// already migrating away, which finish on their healthy destinations).
    pub fn on_host_status_changed(
        &mut self,
        host_id: u32,
        failed: bool,
        time: f64,
    ) -> Result<Vec<(u32, PlacementDecision)>, Error> {
        self.pool.set_host_failed(host_id, failed)?;
        if !failed {
            self.log(Level::Info, time, format!("host {} recovered", host_id));
            return Ok(Vec::new());
        }
        self.stats.host_failures += 1;
        self.log(Level::Warn, time, format!("host {} failed", host_id));

        let mut decisions = Vec::new();

        // Relocations whose destination died cannot land; the evictee stays
        // on its source, which invalidates the owning plan.
        let stranded: Vec<u32> = self
            .pending_migrations
            .iter()
            .filter(|(_, pending)| pending.destination_host == host_id)
            .map(|(&vm_id, _)| vm_id)
            .collect();
        let mut aborted_owners = BTreeSet::new();
        for vm_id in stranded {
            let pending = self
                .pending_migrations
                .remove(&vm_id)
                .ok_or(Error::VmNotFound(vm_id))?;
            self.pool.release(vm_id, pending.destination_host);
            self.pool.dec_migrating_in(pending.destination_host);
            {
                let mut registry = self.registry.borrow_mut();
                registry.set_migrating(vm_id, false)?;
                registry.set_status(vm_id, VmStatus::Placed)?;
            }
            if let Some(owner) = pending.plan_owner {
                aborted_owners.insert(owner);
            }
        }

        // Plans that targeted the failed host can no longer admit their owner.
        let doomed: Vec<u32> = self
            .in_flight_plans
            .iter()
            .filter(|(_, plan)| plan.target_host == host_id)
            .map(|(&owner, _)| owner)
            .collect();
        aborted_owners.extend(doomed);

        for owner in aborted_owners {
            if let Some(plan) = self.in_flight_plans.remove(&owner) {
                // Relocations already in flight finish on their own; they just
                // no longer gate an admission.
                for evictee_id in plan.outstanding {
                    if let Some(pending) = self.pending_migrations.get_mut(&evictee_id) {
                        pending.plan_owner = None;
                    }
                }
            }
            decisions.push((owner, self.defer(owner, time)?));
        }

        // Requeue resident VMs, skipping the ones migrating off this host.
        for vm_id in self.pool.resident_vms(host_id) {
            let migrating_away = self
                .pending_migrations
                .get(&vm_id)
                .map_or(false, |pending| pending.source_host == host_id);
            if migrating_away {
                continue;
            }
            self.pool.release(vm_id, host_id);
            self.placements.remove(&vm_id);
            decisions.push((vm_id, self.defer(vm_id, time)?));
        }
        Ok(decisions)
    }

    /// Withdraws a VM: frees its allocations, stops its retries and unblocks
    /// any plan that was waiting on its relocation.
    pub fn on_vm_cancelled(&mut self, vm_id: u32, time: f64) -> Result<Option<(u32, PlacementDecision)>, Error> {
        if self.registry.borrow().get(vm_id).is_none() {
            return Err(Error::VmNotFound(vm_id));
        }
        self.deferred.retain(|entry| entry.vm_id != vm_id);
        if let Some(host_id) = self.placements.remove(&vm_id) {
            self.pool.release(vm_id, host_id);
        }

        // The VM may itself be a plan owner waiting for relocations.
        if let Some(plan) = self.in_flight_plans.remove(&vm_id) {
            for evictee_id in plan.outstanding {
                if let Some(pending) = self.pending_migrations.get_mut(&evictee_id) {
                    pending.plan_owner = None;
                }
            }
        }

        let mut owner_decision = None;
        if let Some(pending) = self.pending_migrations.remove(&vm_id) {
            self.pool.release(vm_id, pending.source_host);
            self.pool.release(vm_id, pending.destination_host);
            self.pool.dec_migrating_in(pending.destination_host);
            if let Some(owner) = pending.plan_owner {
                let plan_done = match self.in_flight_plans.get_mut(&owner) {
                    Some(plan) => {
                        plan.outstanding.remove(&vm_id);
                        plan.outstanding.is_empty()
                    }
                    None => false,
                };
                if plan_done {
                    let plan = self.in_flight_plans.remove(&owner).ok_or(Error::VmNotFound(owner))?;
                    let decision = self.try_admit_owner(owner, plan.target_host, time)?;
                    owner_decision = Some((owner, decision));
                }
            }
        }

        {
            let mut registry = self.registry.borrow_mut();
            registry.set_migrating(vm_id, false)?;
            registry.set_status(vm_id, VmStatus::Cancelled)?;
        }
        self.stats.cancelled_vms += 1;
        self.log(Level::Info, time, format!("vm {} cancelled", vm_id));
        Ok(owner_decision)
    }

    /// Re-attempts deferred VMs whose retry time has come, in FIFO order.
    pub fn on_reconsolidation_tick(&mut self, time: f64) -> Result<Vec<(u32, PlacementDecision)>, Error> {
        let mut due = Vec::new();
        let mut rest = VecDeque::new();
        while let Some(entry) = self.deferred.pop_front() {
            if entry.retry_at <= time {
                due.push(entry.vm_id);
            } else {
                rest.push_back(entry);
            }
        }
        self.deferred = rest;

        let mut decisions = Vec::new();
        for vm_id in due {
            if self.registry.borrow().status(vm_id) == Some(&VmStatus::Cancelled) {
                continue;
            }
            let decision = self.try_place(vm_id, time)?;
            decisions.push((vm_id, decision));
        }
        Ok(decisions)
    }

    fn defer(&mut self, vm_id: u32, time: f64) -> Result<PlacementDecision, Error> {
        let retry_at = time + self.config.allocation_retry_period;
        self.registry.borrow_mut().set_status(vm_id, VmStatus::Deferred)?;
        self.deferred.push_back(DeferredVm { vm_id, retry_at });
        self.broker.vm_deferred(vm_id, retry_at);
        self.stats.deferrals += 1;
        self.log(
            Level::Info,
            time,
            format!("vm {} deferred, retry at {:.3}", vm_id, retry_at),
        );
        Ok(PlacementDecision::Deferred { retry_at })
    }

    fn log(&self, level: Level, time: f64, message: String) {
        self.logger.borrow_mut().log(level, time, "scheduler", message);
    }
}
