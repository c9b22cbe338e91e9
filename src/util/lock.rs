use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a mutex, recovering the inner state if a previous holder panicked.
///
/// Every critical section in this crate is a short, non-awaiting update of
/// plain collections, so a poisoned guard still holds usable data.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in another task",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    }
}
