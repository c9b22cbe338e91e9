//! Periodic, throttled refresh of design counters.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use atelier_api_types::{Design, DesignStats};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::api::PortfolioApi;
use crate::application::error::FetchError;
use crate::application::fetch::FetchCoordinator;
use crate::pacing::Throttle;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::refresh";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REFRESH_THROTTLE: Duration = Duration::from_secs(5);

type StatsOutcome = Result<Vec<DesignStats>, FetchError>;

/// Pulls `/api/designs/stats` and, when that succeeds, refetches the design
/// list so cached cards pick up fresh counters.
pub struct StatsRefresher {
    throttle: Throttle<(), StatsOutcome>,
    latest: Mutex<Option<Vec<DesignStats>>>,
}

impl StatsRefresher {
    pub fn new(
        api: PortfolioApi,
        designs: Arc<FetchCoordinator<Vec<Design>>>,
        throttle: Duration,
    ) -> Self {
        let throttle = Throttle::new(throttle, move |()| {
            let api = api.clone();
            let designs = Arc::clone(&designs);
            async move {
                let stats = api.design_stats().await?;
                designs.refetch().await;
                Ok::<_, FetchError>(stats)
            }
        });

        Self {
            throttle,
            latest: Mutex::new(None),
        }
    }

    /// Returns `None` when the call fell inside the throttle window.
    pub async fn refresh(&self) -> Option<StatsOutcome> {
        let outcome = self.throttle.call(()).await?;
        match &outcome {
            Ok(stats) => {
                debug!(designs = stats.len(), "Stats refreshed");
                *mutex_lock(&self.latest, SOURCE, "refresh") = Some(stats.clone());
            }
            Err(err) => warn!(error = %err, "Stats refresh failed"),
        }
        Some(outcome)
    }

    pub fn latest(&self) -> Option<Vec<DesignStats>> {
        mutex_lock(&self.latest, SOURCE, "latest").clone()
    }

    /// Refresh every `every`, starting one period from now.
    pub fn spawn(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                refresher.refresh().await;
            }
        })
    }
}
