//! Checkpoint/rollback discipline over the resource pool state.
//!
//! The migration planner evaluates "what if" allocation states before
//! committing. Snapshots are whole-state clones of the pool: an explicit
//! copy-on-write working set rather than an undo log, so a restore is always
//! exact regardless of which mutations happened in between.

use crate::core::error::Error;
use crate::core::resource_pool::ResourcePoolState;

/// Proof of a taken checkpoint. Tokens are move-only, so each checkpoint can
/// be restored or committed at most once and pairs nest correctly.
#[derive(Debug)]
pub struct CheckpointToken {
    index: usize,
}

/// Stack of pool state snapshots.
#[derive(Default)]
pub struct TransactionLog {
    snapshots: Vec<ResourcePoolState>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn depth(&self) -> usize {
        self.snapshots.len()
    }

    /// Saves a snapshot of the pool state.
    pub fn checkpoint(&mut self, pool: &ResourcePoolState) -> CheckpointToken {
        self.snapshots.push(pool.clone());
        CheckpointToken {
            index: self.snapshots.len() - 1,
        }
    }

    /// Restores the pool to the snapshot taken at `token`, discarding any
    /// checkpoints nested inside it. Safe to call when nothing was mutated.
    pub fn restore(&mut self, token: CheckpointToken, pool: &mut ResourcePoolState) -> Result<(), Error> {
        if token.index >= self.snapshots.len() {
            return Err(Error::TransactionMisuse("restore without matching checkpoint"));
        }
        self.snapshots.truncate(token.index + 1);
        let snapshot = self
            .snapshots
            .pop()
            .ok_or(Error::TransactionMisuse("checkpoint stack corrupted"))?;
        *pool = snapshot;
        Ok(())
    }

    /// Drops the snapshot taken at `token`, keeping the current pool state.
    pub fn commit(&mut self, token: CheckpointToken) -> Result<(), Error> {
        if token.index >= self.snapshots.len() {
            return Err(Error::TransactionMisuse("commit without matching checkpoint"));
        }
        self.snapshots.truncate(token.index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Allocation;

    fn pool_with_host() -> ResourcePoolState {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, vec![10], 1000, 100, 100).unwrap();
        pool
    }

    fn alloc(vm_id: u32) -> Allocation {
        Allocation {
            vm_id,
            cpu_usage: 1,
            memory_usage: 10,
            bandwidth_usage: 0,
            storage_usage: 0,
        }
    }

    #[test]
    fn restore_reverts_mutations_exactly() {
        let mut pool = pool_with_host();
        let mut log = TransactionLog::new();
        let before = pool.clone();

        let token = log.checkpoint(&pool);
        pool.allocate(&alloc(2), 1);
        pool.allocate(&alloc(3), 1);
        assert_ne!(pool, before);

        log.restore(token, &mut pool).unwrap();
        assert_eq!(pool, before);
        assert_eq!(log.depth(), 0);
    }

    #[test]
    fn noop_restore_is_safe() {
        let mut pool = pool_with_host();
        let mut log = TransactionLog::new();
        let before = pool.clone();
        let token = log.checkpoint(&pool);
        log.restore(token, &mut pool).unwrap();
        assert_eq!(pool, before);
    }

    #[test]
    fn checkpoints_nest() {
        let mut pool = pool_with_host();
        let mut log = TransactionLog::new();

        let outer = log.checkpoint(&pool);
        pool.allocate(&alloc(2), 1);
        let after_outer = pool.clone();

        let inner = log.checkpoint(&pool);
        pool.allocate(&alloc(3), 1);
        log.restore(inner, &mut pool).unwrap();
        assert_eq!(pool, after_outer);

        log.restore(outer, &mut pool).unwrap();
        assert_eq!(pool, pool_with_host());
    }

    #[test]
    fn out_of_order_restore_is_misuse() {
        let mut pool = pool_with_host();
        let mut log = TransactionLog::new();
        let outer = log.checkpoint(&pool);
        let inner = log.checkpoint(&pool);
        log.restore(outer, &mut pool).unwrap();
        assert_eq!(
            log.restore(inner, &mut pool).unwrap_err(),
            Error::TransactionMisuse("restore without matching checkpoint")
        );
    }

    #[test]
    fn commit_keeps_state() {
        let mut pool = pool_with_host();
        let mut log = TransactionLog::new();
        let token = log.checkpoint(&pool);
        pool.allocate(&alloc(2), 1);
        let mutated = pool.clone();
        log.commit(token).unwrap();
        assert_eq!(pool, mutated);
        assert_eq!(log.depth(), 0);
    }
}
