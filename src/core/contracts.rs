//! Collaborator contracts at the engine boundary.
//!
//! The engine does not transfer VM memory or own VM lifecycles; it signals
//! these collaborators and waits for their notifications (see
//! [`crate::core::events`]).

/// Performs the actual resource transfer of a migrating VM.
///
/// Completion is asynchronous: the engine keeps the source-side resources
/// allocated until the clock delivers a `MigrationCompleted` event for the VM.
pub trait MigrationExecutor {
    fn request_migration(&mut self, vm_id: u32, source_host: u32, destination_host: u32);
}

/// Owns VM objects and re-injects deferred VMs with an updated submission
/// delay.
pub trait Broker {
    fn vm_deferred(&mut self, vm_id: u32, retry_at: f64);
}

/// Executor that drops migration requests, for setups where an external
/// component polls the pending-migration set instead.
#[derive(Default)]
pub struct NoopExecutor;

impl MigrationExecutor for NoopExecutor {
    fn request_migration(&mut self, _vm_id: u32, _source_host: u32, _destination_host: u32) {}
}

/// Broker that ignores deferral notices; the engine's internal retry queue
/// still re-attempts them on reconsolidation ticks.
#[derive(Default)]
pub struct NoopBroker;

impl Broker for NoopBroker {
    fn vm_deferred(&mut self, _vm_id: u32, _retry_at: f64) {}
}
