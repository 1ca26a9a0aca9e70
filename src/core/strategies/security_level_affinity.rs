//! Security-level affinity with an energy objective, after Ahamed,
//! Shahrestani and Javadi's security-aware energy-efficient consolidation:
//! a host only runs VMs of a single security level, and among legal hosts
//! the one with the smallest marginal power increase is preferred.

use crate::core::config::parse_options;
use crate::core::monitoring::HostState;
use crate::core::power_model::{LinearPowerModel, PowerModel};
use crate::core::resource_pool::HostInfo;
use crate::core::strategy::{PlacementStrategy, MUST_EVICT};
use crate::core::vm::VirtualMachine;

#[derive(Clone)]
pub struct SecurityLevelAffinity {
    power_model: Box<dyn PowerModel>,
}

impl SecurityLevelAffinity {
    pub fn new() -> Self {
        Self::with_power_model(Box::new(LinearPowerModel::new(1.0)))
    }

    pub fn with_power_model(power_model: Box<dyn PowerModel>) -> Self {
        Self { power_model }
    }

    pub fn from_options(options_str: &str) -> Self {
        let options = parse_options(options_str);
        let host_power = options
            .get("host_power")
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(1.0);
        Self::with_power_model(Box::new(LinearPowerModel::new(host_power)))
    }
}

impl Default for SecurityLevelAffinity {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for SecurityLevelAffinity {
    fn is_legal(&self, vm: &VirtualMachine, resident: &VirtualMachine) -> bool {
        vm.security_level == resident.security_level
    }

    fn placement_score(&self, vm: &VirtualMachine, host: &HostInfo, util: &HostState) -> f64 {
        let load_after =
            ((util.cpu_load * host.cpu_total as f64 + vm.cpu_usage as f64) / host.cpu_total as f64).min(1.);
        let marginal = self.power_model.power(load_after) - self.power_model.power(util.cpu_load);
        // Higher is better for the selector, so negate the power increase.
        -marginal
    }

    fn host_migration_score(&self, vm: &VirtualMachine, residents: &[VirtualMachine], util: &HostState) -> f64 {
        let mismatched = residents
            .iter()
            .filter(|resident| resident.security_level != vm.security_level)
            .count() as f64;
        let resources = util.cpu_load.clamp(0., 1.) + util.memory_load.clamp(0., 1.);
        (2. * mismatched + 1.) * resources / 2.
    }

    fn eviction_score(&self, vm: &VirtualMachine, resident: &VirtualMachine) -> i64 {
        if resident.security_level != vm.security_level {
            return MUST_EVICT;
        }
        resident.memory_usage as i64 + resident.cpu_usage as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::power_model::ConstantPowerModel;

    fn vm(id: u32, level: u32) -> VirtualMachine {
        VirtualMachine::new(id, 10, 100, 0, 0, level, 0.).unwrap()
    }

    #[test]
    fn legality_is_level_equality() {
        let strategy = SecurityLevelAffinity::new();
        assert!(strategy.is_legal(&vm(2, 1), &vm(4, 1)));
        assert!(!strategy.is_legal(&vm(2, 1), &vm(3, 2)));
    }

    #[test]
    fn eviction_sentinel_on_level_mismatch() {
        let strategy = SecurityLevelAffinity::new();
        assert_eq!(strategy.eviction_score(&vm(2, 1), &vm(3, 2)), MUST_EVICT);
        assert_eq!(strategy.eviction_score(&vm(2, 1), &vm(3, 1)), 110);
    }

    #[test]
    fn placement_prefers_already_powered_hosts() {
        let strategy = SecurityLevelAffinity::new();
        let mut pool = crate::core::resource_pool::ResourcePoolState::new();
        pool.add_host(1, vec![100], 1000, 100, 100).unwrap();
        let host = pool.host(1).unwrap().clone();

        let idle = HostState::new(100, 1000);
        let mut active = idle.clone();
        active.cpu_load = 0.5;

        let probe = vm(2, 0);
        // Powering an idle host pays the idle power cost; a running host only
        // pays the linear part.
        assert!(strategy.placement_score(&probe, &host, &active) > strategy.placement_score(&probe, &host, &idle));
    }

    #[test]
    fn constant_power_model_makes_hosts_indifferent() {
        let strategy = SecurityLevelAffinity::with_power_model(Box::new(ConstantPowerModel::new(0.5)));
        let mut pool = crate::core::resource_pool::ResourcePoolState::new();
        pool.add_host(1, vec![100], 1000, 100, 100).unwrap();
        let host = pool.host(1).unwrap().clone();

        let idle = HostState::new(100, 1000);
        let mut active = idle.clone();
        active.cpu_load = 0.5;

        // No marginal power cost, so every host scores the same.
        let probe = vm(2, 0);
        assert_eq!(strategy.placement_score(&probe, &host, &idle), 0.);
        assert_eq!(strategy.placement_score(&probe, &host, &active), 0.);
    }
}
