//! Physical host power consumption models.

use dyn_clone::{clone_trait_object, DynClone};

/// Computes the power consumption of a host from its current CPU load.
pub trait PowerModel: DynClone {
    fn power(&self, cpu_load: f64) -> f64;
}

clone_trait_object!(PowerModel);

/// Linear power model: `idle_power + cpu_load * (host_power - idle_power)`,
/// relative to a fully loaded host. A host with zero CPU load is assumed to
/// be powered off and draws nothing.
#[derive(Clone)]
pub struct LinearPowerModel {
    host_power: f64,
    idle_power: f64,
}

impl LinearPowerModel {
    pub fn new(host_power: f64) -> Self {
        Self {
            idle_power: 0.4,
            host_power,
        }
    }

    pub fn with_idle_power(host_power: f64, idle_power: f64) -> Self {
        Self { host_power, idle_power }
    }
}

impl PowerModel for LinearPowerModel {
    fn power(&self, cpu_load: f64) -> f64 {
        if cpu_load == 0. {
            return 0.;
        }
        self.idle_power + cpu_load * (self.host_power - self.idle_power)
    }
}

/// Constant power model, mostly useful in tests.
#[derive(Clone)]
pub struct ConstantPowerModel {
    power: f64,
}

impl ConstantPowerModel {
    pub fn new(power: f64) -> Self {
        Self { power }
    }
}

impl PowerModel for ConstantPowerModel {
    fn power(&self, _cpu_load: f64) -> f64 {
        self.power
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_model() {
        let model = LinearPowerModel::new(1.0);
        assert_eq!(model.power(0.), 0.);
        assert_eq!(model.power(1.), 1.0);
        assert!((model.power(0.5) - 0.7).abs() < 1e-12);
    }
}
