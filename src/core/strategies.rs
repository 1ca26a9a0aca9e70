//! Research algorithm variants of the placement strategy.

pub mod security_aware;
pub mod security_level_affinity;
