//! Per-target mutual exclusion

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async lock per target name. Holders of different targets never
/// contend; callers on the same target queue in arrival order.
#[derive(Debug, Default)]
pub struct TargetLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// True when someone currently holds `name`
    pub async fn is_locked(&self, name: &str) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(name)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
