//! Read-only host utilization snapshots.
//!
//! Actual CPU/memory utilization is produced by the external utilization and
//! power collaborator and pushed here via [`Monitoring::update_host_state`];
//! the scorers only read it. Like in a real system, the information may lag
//! behind the committed allocation state.

use std::collections::BTreeMap;

use crate::core::resource_pool::HostInfo;

/// Last observed utilization of a host together with its capacity.
#[derive(Clone, Debug, PartialEq)]
pub struct HostState {
    pub cpu_load: f64,
    pub memory_load: f64,
    pub cpu_total: u32,
    pub memory_total: u64,
}

impl HostState {
    pub fn new(cpu_total: u32, memory_total: u64) -> Self {
        Self {
            cpu_load: 0.,
            memory_load: 0.,
            cpu_total,
            memory_total,
        }
    }
}

/// Stores the latest host states received from the utilization collaborator.
#[derive(Default)]
pub struct Monitoring {
    host_states: BTreeMap<u32, HostState>,
}

impl Monitoring {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_host(&mut self, host_id: u32, cpu_total: u32, memory_total: u64) {
        self.host_states.insert(host_id, HostState::new(cpu_total, memory_total));
    }

    /// Records a utilization sample for the host.
    pub fn update_host_state(&mut self, host_id: u32, cpu_load: f64, memory_load: f64) {
        if let Some(state) = self.host_states.get_mut(&host_id) {
            state.cpu_load = cpu_load;
            state.memory_load = memory_load;
        }
    }

    /// Returns the stored state for the host, or an idle state derived from
    /// the host's capacity if no sample arrived yet.
    pub fn snapshot(&self, host_id: u32, host: &HostInfo) -> HostState {
        self.host_states
            .get(&host_id)
            .cloned()
            .unwrap_or_else(|| HostState::new(host.cpu_total, host.memory_total))
    }
}
