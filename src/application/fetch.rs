//! Fetch coordinator: one logical GET bound to a path, with cache-first loads,
//! manual refetch and observable state.
//!
//! Every network attempt takes a ticket from a monotonic sequence. A
//! completion whose ticket is no longer the newest is discarded, so a slow
//! request can never overwrite the result of a later one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::application::api::decode;
use crate::application::error::FetchError;
use crate::application::ports::HttpTransport;
use crate::cache::ResponseCache;

const METRIC_FETCH_MS: &str = "atelier_fetch_ms";
const METRIC_FETCH_STALE: &str = "atelier_fetch_stale_discarded_total";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Consult and populate the shared response cache.
    pub cache: bool,
    pub cache_ttl: Duration,
    /// Load as soon as the coordinator is started.
    pub immediate: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            immediate: true,
        }
    }
}

pub struct FetchCoordinator<T> {
    path: String,
    options: FetchOptions,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<ResponseCache>,
    state: watch::Sender<FetchState<T>>,
    issued: AtomicU64,
}

impl<T> FetchCoordinator<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        path: impl Into<String>,
        options: FetchOptions,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let (state, _) = watch::channel(FetchState::default());
        Self {
            path: path.into(),
            options,
            transport,
            cache,
            state,
            issued: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Perform the initial load when the coordinator is `immediate`.
    pub async fn start(&self) {
        if self.options.immediate {
            self.load().await;
        }
    }

    /// Cache-first load: a live cache entry is adopted without touching the
    /// network.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn load(&self) {
        if let Some(data) = self.cached() {
            debug!("Adopted cached response");
            self.state.send_modify(|state| {
                state.data = Some(data);
                state.loading = false;
                state.error = None;
            });
            return;
        }
        self.fetch_network().await;
    }

    /// Always goes to the network; a successful response overwrites the cache.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn refetch(&self) {
        self.fetch_network().await;
    }

    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    fn cached(&self) -> Option<T> {
        if !self.options.cache {
            return None;
        }
        let value = self.cache.get(&self.path)?;
        match decode(value) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(error = %err, "Discarding undecodable cache entry");
                self.cache.remove(&self.path);
                None
            }
        }
    }

    async fn fetch_network(&self) {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let started = Instant::now();
        let outcome = self.request().await;
        histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let newest = self.issued.load(Ordering::SeqCst);
        if ticket != newest {
            counter!(METRIC_FETCH_STALE).increment(1);
            debug!(ticket, newest, "Discarded stale completion");
            return;
        }

        match outcome {
            Ok((raw, data)) => {
                if self.options.cache {
                    self.cache.set(self.path.clone(), raw, self.options.cache_ttl);
                }
                self.state.send_modify(|state| {
                    state.data = Some(data);
                    state.loading = false;
                    state.error = None;
                });
            }
            Err(err) => {
                warn!(error = %err, "Fetch failed; keeping last known data");
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(err.to_string());
                });
            }
        }
    }

    async fn request(&self) -> Result<(Value, T), FetchError> {
        let raw = self.transport.get_json(&self.path).await?;
        let data = decode(raw.clone())?;
        Ok((raw, data))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::testing::FakeTransport;
    use crate::cache::CacheConfig;

    const PATH: &str = "/api/designs";
    const ROUTE: &str = "GET /api/designs";

    type Setup = (
        Arc<FakeTransport>,
        Arc<ResponseCache>,
        FetchCoordinator<Vec<String>>,
    );

    fn setup(options: FetchOptions) -> Setup {
        let transport = FakeTransport::new();
        let cache = Arc::new(ResponseCache::new(&CacheConfig::default()));
        let coordinator =
            FetchCoordinator::new(PATH, options, transport.clone(), Arc::clone(&cache));
        (transport, cache, coordinator)
    }

    #[tokio::test(start_paused = true)]
    async fn live_cache_entry_is_adopted_without_network() {
        let (transport, cache, coordinator) = setup(FetchOptions::default());
        cache.set(PATH, json!(["cached"]), Duration::from_secs(60));

        coordinator.start().await;

        assert_eq!(
            coordinator.state(),
            FetchState {
                data: Some(vec!["cached".to_string()]),
                loading: false,
                error: None,
            }
        );
        assert_eq!(transport.calls(ROUTE), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn miss_goes_to_network_and_populates_cache() {
        let (transport, cache, coordinator) = setup(FetchOptions::default());
        transport.respond(ROUTE, Ok(json!(["fresh"])));

        coordinator.load().await;
        coordinator.load().await;

        assert_eq!(coordinator.state().data, Some(vec!["fresh".to_string()]));
        assert_eq!(transport.calls(ROUTE), 1);
        assert_eq!(cache.get(PATH), Some(json!(["fresh"])));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_network_load() {
        let options = FetchOptions {
            cache_ttl: Duration::from_secs(120),
            ..FetchOptions::default()
        };
        let (transport, _cache, coordinator) = setup(options);
        transport.respond(ROUTE, Ok(json!(["a"])));

        coordinator.load().await;
        tokio::time::advance(Duration::from_secs(121)).await;
        coordinator.load().await;

        assert_eq!(transport.calls(ROUTE), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_bypasses_live_entry_and_repopulates() {
        let (transport, cache, coordinator) = setup(FetchOptions::default());
        cache.set(PATH, json!(["old"]), Duration::from_secs(60));
        transport.respond(ROUTE, Ok(json!(["new"])));

        coordinator.refetch().await;

        assert_eq!(transport.calls(ROUTE), 1);
        assert_eq!(coordinator.state().data, Some(vec!["new".to_string()]));
        assert_eq!(cache.get(PATH), Some(json!(["new"])));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_is_discarded() {
        let (transport, cache, coordinator) = setup(FetchOptions::default());
        transport.respond_once(ROUTE, Ok(json!(["slow"])), Duration::from_millis(500));
        transport.respond_once(ROUTE, Ok(json!(["quick"])), Duration::from_millis(10));

        tokio::join!(coordinator.refetch(), async {
            tokio::task::yield_now().await;
            coordinator.refetch().await;
        });

        assert_eq!(transport.calls(ROUTE), 2);
        assert_eq!(coordinator.state().data, Some(vec!["quick".to_string()]));
        assert!(!coordinator.state().loading);
        assert_eq!(cache.get(PATH), Some(json!(["quick"])));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_last_known_data() {
        let (transport, _cache, coordinator) = setup(FetchOptions::default());
        transport.respond_once(ROUTE, Ok(json!(["good"])), Duration::ZERO);
        transport.respond(
            ROUTE,
            Err(FetchError::Status {
                status: 500,
                body: "oops".into(),
            }),
        );

        coordinator.load().await;
        coordinator.refetch().await;

        let state = coordinator.state();
        assert_eq!(state.data, Some(vec!["good".to_string()]));
        assert!(!state.loading);
        assert_eq!(
            state.error.as_deref(),
            Some("request failed with status 500: oops")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_cache_entry_counts_as_miss() {
        let (transport, cache, coordinator) = setup(FetchOptions::default());
        cache.set(PATH, json!({"not": "a list"}), Duration::from_secs(60));
        transport.respond(ROUTE, Ok(json!(["fresh"])));

        coordinator.load().await;

        assert_eq!(transport.calls(ROUTE), 1);
        assert_eq!(coordinator.state().data, Some(vec!["fresh".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn uncached_coordinator_ignores_cache() {
        let options = FetchOptions {
            cache: false,
            ..FetchOptions::default()
        };
        let (transport, cache, coordinator) = setup(options);
        cache.set(PATH, json!(["cached"]), Duration::from_secs(60));
        transport.respond(ROUTE, Ok(json!(["fresh"])));

        coordinator.load().await;

        assert_eq!(transport.calls(ROUTE), 1);
        assert_eq!(cache.get(PATH), Some(json!(["cached"])));
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_coordinator_waits_for_explicit_load() {
        let options = FetchOptions {
            immediate: false,
            ..FetchOptions::default()
        };
        let (transport, _cache, coordinator) = setup(options);

        coordinator.start().await;

        assert_eq!(transport.calls(ROUTE), 0);
        assert_eq!(coordinator.state(), FetchState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_loading_then_success() {
        let (transport, _cache, coordinator) = setup(FetchOptions::default());
        transport.respond_once(ROUTE, Ok(json!(["a"])), Duration::from_millis(100));
        let mut updates = coordinator.subscribe();

        let (_, saw_loading) = tokio::join!(coordinator.load(), async {
            updates.changed().await.expect("open");
            updates.borrow_and_update().loading
        });

        assert!(saw_loading);
        assert!(!coordinator.state().loading);
    }
}
