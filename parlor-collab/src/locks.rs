use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::PrimaryKey;

/// A keyed lock table turning each entity id into its own serialization
/// domain: operations against the same id run one at a time, operations
/// against distinct ids run fully in parallel.
#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: DashMap<PrimaryKey, Arc<Mutex<()>>>,
}

impl EntityLocks {
    /// Acquires the lock for `id`, creating it on first use. The guard must
    /// be held across the whole read-check-write sequence of the caller.
    pub async fn acquire(&self, id: PrimaryKey) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }
}
