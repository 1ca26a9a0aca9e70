//! Crate error taxonomy.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid vm id {0}")]
    InvalidVmId(u32),
    #[error("invalid host id {0}")]
    InvalidHostId(u32),
    #[error("invalid resource demand of vm {0}")]
    InvalidDemand(u32),
    #[error("invalid capacity of host {0}")]
    InvalidCapacity(u32),
    #[error("vm id {0} is already registered")]
    DuplicateVmId(u32),
    #[error("host id {0} is already registered")]
    DuplicateHostId(u32),
    #[error("vm {0} not found")]
    VmNotFound(u32),
    #[error("host {0} not found")]
    HostNotFound(u32),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("transaction misuse: {0}")]
    TransactionMisuse(&'static str),
    #[error("plan invariant violated: {0}")]
    PlanInvariantViolated(String),
}
