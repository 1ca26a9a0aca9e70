//! Placement strategies.
//!
//! A strategy is a small capability set — co-residency legality, a placement
//! score, a migration-target score and an eviction priority — injected into
//! the selector and the planner. Research algorithm variants live in
//! [`crate::core::strategies`] and are resolved from a config string just
//! like any other pluggable component.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::config::parse_config_value;
use crate::core::monitoring::HostState;
use crate::core::resource_pool::HostInfo;
use crate::core::strategies::security_aware::SecurityAware;
use crate::core::strategies::security_level_affinity::SecurityLevelAffinity;
use crate::core::vm::VirtualMachine;

/// Eviction score marking a resident VM that must leave the host before the
/// incoming VM can be admitted. Sorts ahead of every regular score.
pub const MUST_EVICT: i64 = -1;

pub trait PlacementStrategy: DynClone {
    /// Whether `vm` may co-reside with `resident` on the same host.
    fn is_legal(&self, vm: &VirtualMachine, resident: &VirtualMachine) -> bool;

    /// Placement suitability of a host for `vm`; higher is better.
    fn placement_score(&self, vm: &VirtualMachine, host: &HostInfo, util: &HostState) -> f64;

    /// How safe it is to evict resident VMs from this host to make room for
    /// `vm`; lower is better, `f64::MAX` means "never choose this host".
    fn host_migration_score(&self, vm: &VirtualMachine, residents: &[VirtualMachine], util: &HostState) -> f64;

    /// Eviction priority of `resident` when `vm` arrives; ascending sort
    /// order, [`MUST_EVICT`] sorts first.
    fn eviction_score(&self, vm: &VirtualMachine, resident: &VirtualMachine) -> i64;
}

clone_trait_object!(PlacementStrategy);

/// Resolves a strategy from its config string,
/// e.g. `SecurityAware` or `SecurityLevelAffinity[host_power=0.9]`.
pub fn strategy_resolver(config_str: &str) -> Box<dyn PlacementStrategy> {
    let (name, options) = parse_config_value(config_str);
    match name.as_str() {
        "SecurityAware" => Box::new(SecurityAware::new()),
        "SecurityLevelAffinity" => Box::new(SecurityLevelAffinity::from_options(&options.unwrap_or_default())),
        _ => panic!("Can't resolve placement strategy: {}", config_str),
    }
}
