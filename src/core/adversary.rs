//! Pairwise VM adversary predicate.

/// Returns whether two VMs are mutually hostile and must never co-reside.
///
/// Two VMs are adversaries iff the id of one divides the id of the other.
/// Since 1 divides everything, the VM with id 1 is an adversary of every
/// other VM. The relation is symmetric but not transitive.
///
/// Ids must be positive; a zero id is a caller contract violation.
pub fn is_adversary(a: u32, b: u32) -> bool {
    assert!(a > 0 && b > 0, "vm ids must be positive");
    a % b == 0 || b % a == 0
}
