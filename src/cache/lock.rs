use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

// Poisoned locks are recovered: a panic while a store is locked leaves the map intact.

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(
            op,
            store,
            lock_kind = "rwlock.read",
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(
            op,
            store,
            lock_kind = "rwlock.write",
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}
