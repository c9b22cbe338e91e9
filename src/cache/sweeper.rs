//! Background purge of expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::store::TtlCache;

/// Spawn a task that purges expired entries every `every`.
///
/// The first tick is skipped so a freshly started cache is left alone. Abort
/// the returned handle to stop the sweeper.
pub fn spawn_sweeper<V>(cache: Arc<TtlCache<V>>, every: Duration) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = cache.len(), "Purged expired cache entries");
            }
        }
    })
}
