//! Top-level engine facade.
//!
//! Wires the scheduler, registry and monitoring together from a
//! [`SimConfig`], expands host set definitions into concrete hosts and
//! dispatches boundary events to the scheduler. The surrounding simulation
//! (or service) owns the clock and feeds events in timestamp order.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use crate::core::config::SimConfig;
use crate::core::contracts::{Broker, MigrationExecutor, NoopBroker, NoopExecutor};
use crate::core::error::Error;
use crate::core::events::CloudEvent;
use crate::core::logger::{Logger, StdoutLogger};
use crate::core::migration::MigrationPlanner;
use crate::core::monitoring::Monitoring;
use crate::core::resource_pool::ResourcePoolState;
use crate::core::scheduler::{PlacementDecision, Scheduler, SchedulerStats};
use crate::core::selector::PlacementSelector;
use crate::core::strategy::strategy_resolver;
use crate::core::vm::{VirtualMachine, VmStatus};
use crate::core::vm_registry::VmRegistry;

pub struct PlacementEngine {
    scheduler: Scheduler,
    registry: Rc<RefCell<VmRegistry>>,
    monitoring: Rc<RefCell<Monitoring>>,
    logger: Rc<RefCell<Box<dyn Logger>>>,
    host_names: BTreeMap<u32, String>,
    next_host_id: u32,
    config: Rc<SimConfig>,
}

impl PlacementEngine {
    /// Creates an engine with default collaborators (stdout logging, no
    /// external executor or broker).
    pub fn new(config: SimConfig) -> Result<Self, Error> {
        Self::with_collaborators(
            config,
            Box::new(StdoutLogger::new()),
            Box::new(NoopExecutor),
            Box::new(NoopBroker),
        )
    }

    pub fn with_collaborators(
        config: SimConfig,
        logger: Box<dyn Logger>,
        executor: Box<dyn MigrationExecutor>,
        broker: Box<dyn Broker>,
    ) -> Result<Self, Error> {
        let config = rc!(config);
        let registry = rc!(refcell!(VmRegistry::new()));
        let monitoring = rc!(refcell!(Monitoring::new()));
        let logger: Rc<RefCell<Box<dyn Logger>>> = rc!(refcell!(logger));
        let selector = PlacementSelector::new(strategy_resolver(&config.strategy));
        let planner = MigrationPlanner::new(config.overutilization_threshold);
        let scheduler = Scheduler::new(
            selector,
            planner,
            registry.clone(),
            monitoring.clone(),
            logger.clone(),
            executor,
            broker,
            config.clone(),
        );
        let mut engine = Self {
            scheduler,
            registry,
            monitoring,
            logger,
            host_names: BTreeMap::new(),
            next_host_id: 1,
            config: config.clone(),
        };
        for host_config in &config.hosts {
            let count = host_config.count.unwrap_or(1);
            for i in 0..count {
                let name = if count == 1 {
                    host_config
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("host{}", engine.next_host_id))
                } else {
                    let prefix = host_config.name_prefix.clone().unwrap_or_else(|| "host".to_string());
                    format!("{}{}", prefix, i + 1)
                };
                engine.add_host(
                    &name,
                    host_config.pe_mips.clone(),
                    host_config.memory,
                    host_config.bandwidth,
                    host_config.storage,
                )?;
            }
        }
        Ok(engine)
    }

    /// Adds a host to the pool, assigning it the next free id.
    pub fn add_host(
        &mut self,
        name: &str,
        pe_mips: Vec<u32>,
        memory: u64,
        bandwidth: u64,
        storage: u64,
    ) -> Result<u32, Error> {
        let id = self.next_host_id;
        self.scheduler.add_host(id, pe_mips, memory, bandwidth, storage)?;
        self.host_names.insert(id, name.to_string());
        self.next_host_id += 1;
        Ok(id)
    }

    /// Dispatches a boundary event. Returns the placement decisions produced
    /// while handling it, tagged with the VM they concern.
    pub fn handle(&mut self, event: CloudEvent, time: f64) -> Result<Vec<(u32, PlacementDecision)>, Error> {
        match event {
            CloudEvent::VmSubmitted { vm } => {
                let vm_id = vm.id;
                let decision = self.scheduler.on_vm_submitted(vm, time)?;
                Ok(vec![(vm_id, decision)])
            }
            CloudEvent::HostStatusChanged { host_id, failed } => {
                self.scheduler.on_host_status_changed(host_id, failed, time)
            }
            CloudEvent::ReconsolidationTick => self.scheduler.on_reconsolidation_tick(time),
            CloudEvent::MigrationCompleted { vm_id } => {
                Ok(self.scheduler.on_migration_completed(vm_id, time)?.into_iter().collect())
            }
            CloudEvent::VmCancelled { vm_id } => {
                Ok(self.scheduler.on_vm_cancelled(vm_id, time)?.into_iter().collect())
            }
        }
    }

    pub fn submit_vm(&mut self, vm: VirtualMachine, time: f64) -> Result<PlacementDecision, Error> {
        self.scheduler.on_vm_submitted(vm, time)
    }

    pub fn tick(&mut self, time: f64) -> Result<Vec<(u32, PlacementDecision)>, Error> {
        self.scheduler.on_reconsolidation_tick(time)
    }

    pub fn migration_completed(&mut self, vm_id: u32, time: f64) -> Result<Option<(u32, PlacementDecision)>, Error> {
        self.scheduler.on_migration_completed(vm_id, time)
    }

    pub fn host_failed(&mut self, host_id: u32, time: f64) -> Result<Vec<(u32, PlacementDecision)>, Error> {
        self.scheduler.on_host_status_changed(host_id, true, time)
    }

    pub fn cancel_vm(&mut self, vm_id: u32, time: f64) -> Result<Option<(u32, PlacementDecision)>, Error> {
        self.scheduler.on_vm_cancelled(vm_id, time)
    }

    /// Feeds a utilization sample for the host to the scorers.
    pub fn update_host_state(&mut self, host_id: u32, cpu_load: f64, memory_load: f64) {
        self.monitoring.borrow_mut().update_host_state(host_id, cpu_load, memory_load);
    }

    pub fn pool(&self) -> &ResourcePoolState {
        self.scheduler.pool()
    }

    pub fn stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }

    pub fn placement_of(&self, vm_id: u32) -> Option<u32> {
        self.scheduler.placement_of(vm_id)
    }

    pub fn deferred_count(&self) -> usize {
        self.scheduler.deferred_count()
    }

    pub fn vm_status(&self, vm_id: u32) -> Option<VmStatus> {
        self.registry.borrow().status(vm_id).cloned()
    }

    pub fn host_name(&self, host_id: u32) -> Option<String> {
        self.host_names.get(&host_id).cloned()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Saves the buffered decision log, if the configured logger keeps one.
    pub fn save_log(&self, path: &str) -> Result<(), std::io::Error> {
        self.logger.borrow().save_log(path)
    }
}
