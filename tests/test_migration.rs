use std::cell::RefCell;
use std::rc::Rc;

use secure_iaas::core::config::SimConfig;
use secure_iaas::core::contracts::{MigrationExecutor, NoopBroker};
use secure_iaas::core::error::Error;
use secure_iaas::core::logger::StdoutLogger;
use secure_iaas::core::migration::MigrationPlanner;
use secure_iaas::core::monitoring::Monitoring;
use secure_iaas::core::resource_pool::ResourcePoolState;
use secure_iaas::core::scheduler::PlacementDecision;
use secure_iaas::core::selector::PlacementSelector;
use secure_iaas::core::strategy::strategy_resolver;
use secure_iaas::core::transaction::TransactionLog;
use secure_iaas::core::vm::{VirtualMachine, VmStatus};
use secure_iaas::core::vm_registry::VmRegistry;
use secure_iaas::engine::PlacementEngine;

fn default_config() -> SimConfig {
    SimConfig::from_str("{}").unwrap()
}

fn vm(id: u32, cpu: u32, memory: u64) -> VirtualMachine {
    VirtualMachine::new(id, cpu, memory, 0, 0, 0, 0.).unwrap()
}

#[derive(Clone, Default)]
struct RecordingExecutor {
    requests: Rc<RefCell<Vec<(u32, u32, u32)>>>,
}

impl MigrationExecutor for RecordingExecutor {
    fn request_migration(&mut self, vm_id: u32, source_host: u32, destination_host: u32) {
        self.requests.borrow_mut().push((vm_id, source_host, destination_host));
    }
}

/// Host A holds vms 3 and 5; vm 6 conflicts with vm 3 (3 divides 6) and only
/// fits on A. The engine should plan the relocation of vm 3 to host B and
/// admit vm 6 once that migration completes.
#[test]
fn eviction_plan_admits_vm_after_relocation() {
    let executor = RecordingExecutor::default();
    let requests = executor.requests.clone();
    let mut engine = PlacementEngine::with_collaborators(
        default_config(),
        Box::new(StdoutLogger::new()),
        Box::new(executor),
        Box::new(NoopBroker),
    )
    .unwrap();
    let a = engine.add_host("a", vec![16], 4096, 1_000, 100_000).unwrap();
    engine.submit_vm(vm(3, 2, 256), 0.).unwrap();
    engine.submit_vm(vm(5, 2, 256), 0.).unwrap();
    let b = engine.add_host("b", vec![4], 512, 1_000, 100_000).unwrap();

    let decision = engine.submit_vm(vm(6, 8, 2048), 1.).unwrap();
    let plan = match decision {
        PlacementDecision::MigrationPlanned { plan } => plan,
        other => panic!("expected a migration plan, got {:?}", other),
    };
    assert_eq!(plan.incoming_vm, 6);
    assert_eq!(plan.target_host, a);
    assert_eq!(plan.relocations.get(&3), Some(&b));
    assert_eq!(plan.relocations.len(), 1);
    assert_eq!(*requests.borrow(), vec![(3, a, b)]);

    // While the migration is in flight, vm 3 holds capacity on both hosts
    // and vm 6 is not yet admitted.
    assert_eq!(engine.vm_status(3), Some(VmStatus::Migrating));
    assert_eq!(engine.vm_status(6), Some(VmStatus::Planning));
    assert_eq!(engine.pool().resident_vms(a), vec![3, 5]);
    assert_eq!(engine.pool().resident_vms(b), vec![3]);
    assert_eq!(engine.pool().host(b).unwrap().migrating_in, 1);

    let admitted = engine.migration_completed(3, 2.).unwrap();
    assert_eq!(admitted, Some((6, PlacementDecision::Placed { host_id: a })));
    assert_eq!(engine.placement_of(3), Some(b));
    assert_eq!(engine.placement_of(6), Some(a));
    assert_eq!(engine.pool().resident_vms(a), vec![5, 6]);
    assert_eq!(engine.pool().resident_vms(b), vec![3]);
    assert_eq!(engine.pool().host(b).unwrap().migrating_in, 0);

    let stats = engine.stats();
    assert_eq!(stats.migrations_planned, 1);
    assert_eq!(stats.migrations_completed, 1);
    assert_eq!(stats.planned_admissions, 1);
}

/// While vm 3 migrates from A to B for vm 6's plan, an arriving adversary of
/// vm 3 must not plan a second eviction of it: the in-flight reservation on B
/// stays untouched and the first plan still admits its owner on completion.
#[test]
fn in_flight_evictee_is_not_evicted_again() {
    let executor = RecordingExecutor::default();
    let requests = executor.requests.clone();
    let mut engine = PlacementEngine::with_collaborators(
        default_config(),
        Box::new(StdoutLogger::new()),
        Box::new(executor),
        Box::new(NoopBroker),
    )
    .unwrap();
    let a = engine.add_host("a", vec![16], 4096, 1_000, 100_000).unwrap();
    engine.submit_vm(vm(3, 2, 256), 0.).unwrap();
    engine.submit_vm(vm(5, 2, 256), 0.).unwrap();
    let b = engine.add_host("b", vec![4], 512, 1_000, 100_000).unwrap();
    engine.submit_vm(vm(6, 8, 2048), 1.).unwrap();
    assert_eq!(engine.vm_status(3), Some(VmStatus::Migrating));

    // 3 divides 9, so vm 9 could only enter host A by evicting vm 3 again;
    // host C would be the relocation destination if that were allowed.
    let c = engine.add_host("c", vec![4], 512, 1_000, 100_000).unwrap();
    let decision = engine.submit_vm(vm(9, 8, 400), 1.5).unwrap();
    assert!(matches!(decision, PlacementDecision::Deferred { .. }));
    assert_eq!(*requests.borrow(), vec![(3, a, b)]);
    assert_eq!(engine.pool().resident_vms(b), vec![3]);
    assert!(engine.pool().resident_vms(c).is_empty());
    assert_eq!(engine.pool().host(b).unwrap().migrating_in, 1);

    let admitted = engine.migration_completed(3, 2.).unwrap();
    assert_eq!(admitted, Some((6, PlacementDecision::Placed { host_id: a })));
    assert_eq!(engine.placement_of(3), Some(b));
    assert_eq!(engine.pool().host(b).unwrap().migrating_in, 0);
    assert_eq!(engine.vm_status(9), Some(VmStatus::Deferred));
}

/// Same scenario, but host B cannot absorb the evictee. The plan must be
/// rejected and the speculative mutations rolled back exactly.
#[test]
fn infeasible_eviction_leaves_no_trace() {
    let mut engine = PlacementEngine::new(default_config()).unwrap();
    engine.add_host("a", vec![16], 4096, 1_000, 100_000).unwrap();
    engine.submit_vm(vm(3, 2, 256), 0.).unwrap();
    engine.submit_vm(vm(5, 2, 256), 0.).unwrap();
    engine.add_host("b", vec![4], 128, 1_000, 100_000).unwrap();
    let before = engine.pool().clone();

    let decision = engine.submit_vm(vm(6, 8, 2048), 1.).unwrap();
    assert!(matches!(decision, PlacementDecision::Deferred { .. }));
    assert_eq!(engine.pool(), &before);
    assert_eq!(engine.stats().rejected_plans, 1);
}

/// A host that would end up above the over-utilization threshold is never
/// chosen as a migration target.
#[test]
fn overloaded_target_is_rejected() {
    let mut engine = PlacementEngine::new(default_config()).unwrap();
    engine.add_host("a", vec![10], 1000, 1_000, 100_000).unwrap();
    engine.submit_vm(vm(3, 2, 200), 0.).unwrap();

    // 0.9 CPU allocation after admission exceeds the default 0.8 threshold.
    let decision = engine.submit_vm(vm(6, 7, 500), 1.).unwrap();
    assert!(matches!(decision, PlacementDecision::Deferred { .. }));
    assert_eq!(engine.stats().rejected_plans, 1);
}

/// Cancelling the last in-flight evictee releases its reservations and
/// unblocks the owner's admission.
#[test]
fn cancelled_evictee_unblocks_admission() {
    let mut engine = PlacementEngine::new(default_config()).unwrap();
    let a = engine.add_host("a", vec![16], 4096, 1_000, 100_000).unwrap();
    engine.submit_vm(vm(3, 2, 256), 0.).unwrap();
    engine.submit_vm(vm(5, 2, 256), 0.).unwrap();
    let b = engine.add_host("b", vec![4], 512, 1_000, 100_000).unwrap();
    engine.submit_vm(vm(6, 8, 2048), 1.).unwrap();

    let admitted = engine.cancel_vm(3, 2.).unwrap();
    assert_eq!(admitted, Some((6, PlacementDecision::Placed { host_id: a })));
    assert_eq!(engine.vm_status(3), Some(VmStatus::Cancelled));
    assert_eq!(engine.pool().resident_vms(a), vec![5, 6]);
    assert!(engine.pool().resident_vms(b).is_empty());
    assert_eq!(engine.pool().host(b).unwrap().migrating_in, 0);
    assert_eq!(engine.stats().cancelled_vms, 1);
}

/// Direct planner checks that need no scheduler around them.
mod planner {
    use super::*;

    struct Setup {
        pool: ResourcePoolState,
        tx_log: TransactionLog,
        monitoring: Monitoring,
        registry: VmRegistry,
        selector: PlacementSelector,
        planner: MigrationPlanner,
    }

    fn setup() -> Setup {
        Setup {
            pool: ResourcePoolState::new(),
            tx_log: TransactionLog::new(),
            monitoring: Monitoring::new(),
            registry: VmRegistry::new(),
            selector: PlacementSelector::new(strategy_resolver("SecurityAware")),
            planner: MigrationPlanner::new(0.8),
        }
    }

    #[test]
    fn empty_host_yields_trivial_plan() {
        let mut s = setup();
        s.pool.add_host(1, vec![10], 1000, 100, 100).unwrap();
        let probe = vm(6, 2, 100);
        let plan = s
            .planner
            .plan(
                &probe,
                &s.selector,
                &mut s.pool,
                &mut s.tx_log,
                &s.monitoring,
                &s.registry,
                None,
            )
            .unwrap()
            .unwrap();
        assert_eq!(plan.target_host, 1);
        assert!(plan.relocations.is_empty());
        assert_eq!(s.tx_log.depth(), 0);
    }

    #[test]
    fn resident_incoming_vm_is_an_invariant_violation() {
        let mut s = setup();
        s.pool.add_host(1, vec![100], 10_000, 1_000, 1_000).unwrap();
        let probe = vm(6, 2, 100);
        s.registry.register(probe.clone()).unwrap();
        s.pool.allocate(&probe.allocation(), 1);
        let before = s.pool.clone();

        let err = s
            .planner
            .plan(
                &probe,
                &s.selector,
                &mut s.pool,
                &mut s.tx_log,
                &s.monitoring,
                &s.registry,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::PlanInvariantViolated(_)));
        assert_eq!(s.pool, before);
    }
}
