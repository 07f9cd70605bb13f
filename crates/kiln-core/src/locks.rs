//! Per-key async mutual exclusion.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of async mutexes created on demand, one per key.
///
/// Unrelated keys never contend; an entry is dropped once nobody holds or awaits it, including
/// waiters whose `lock` future was dropped before it resolved.
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

/// Registration of one user of a slot; releases the slot when dropped.
struct Lease<'a, K>
where
    K: Eq + Hash + Clone,
{
    locks: &'a KeyedLocks<K>,
    key: K,
}

impl<K> Drop for Lease<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// Held lock of one key. The mutex guard is released before the lease.
pub struct KeyedGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    _guard: OwnedMutexGuard<()>,
    _lease: Lease<'a, K>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let (lease, mutex) = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                mutex: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            let lease = Lease {
                locks: self,
                key: key.clone(),
            };
            (lease, Arc::clone(&slot.mutex))
        };
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
