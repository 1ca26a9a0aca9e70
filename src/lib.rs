//! Security-aware virtual machine placement and consolidation engine.
//!
//! Given a pool of physical hosts and a stream of VM placement requests, the
//! engine selects a host for each VM subject to a hard adversarial-exclusion
//! constraint (certain VM pairs must never co-reside) and a soft
//! load-balancing/energy objective. When no host can legally accept a VM, the
//! engine plans migration-based consolidation: it evicts adversary VMs from a
//! candidate host, relocates them elsewhere and only then admits the incoming
//! VM. All planning runs against a checkpointed copy of the resource pool
//! state, so rejected plans leave no trace.
//!
//! The discrete-event clock, utilization playback and migration transfer
//! mechanics are external collaborators; their contracts live in
//! [`core::contracts`] and [`core::events`].

pub mod core;
pub mod engine;
