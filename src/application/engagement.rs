//! View reporting: at most one debounced "view" POST per design per session.
//!
//! Membership in [`ViewedSet`] is the session-wide guard. It is independent of
//! any card's visibility latch, so a card that is unmounted and mounted again
//! is still reported only once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::api::PortfolioApi;
use crate::pacing::KeyedDebounce;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::engagement";
const METRIC_VIEW_REPORT: &str = "atelier_view_report_total";

pub const DEFAULT_VIEW_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Designs already reported as viewed. Grows monotonically.
#[derive(Debug, Default)]
pub struct ViewedSet {
    ids: Mutex<HashSet<String>>,
}

impl ViewedSet {
    /// Returns true when `design_id` was not in the set before.
    pub fn insert(&self, design_id: &str) -> bool {
        mutex_lock(&self.ids, SOURCE, "insert").insert(design_id.to_string())
    }

    pub fn contains(&self, design_id: &str) -> bool {
        mutex_lock(&self.ids, SOURCE, "contains").contains(design_id)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.ids, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct EngagementReporter {
    viewed: ViewedSet,
    reports: KeyedDebounce<String, ()>,
}

impl EngagementReporter {
    pub fn new(api: PortfolioApi, debounce: Duration) -> Self {
        let reports = KeyedDebounce::new(debounce, move |design_id: String, ()| {
            let api = api.clone();
            async move {
                match api.report_view(&design_id).await {
                    Ok(response) => {
                        counter!(METRIC_VIEW_REPORT, "result" => "ok").increment(1);
                        debug!(design_id = %design_id, views = response.views, "View reported");
                    }
                    Err(err) => {
                        counter!(METRIC_VIEW_REPORT, "result" => err.kind()).increment(1);
                        warn!(design_id = %design_id, error = %err, "View report failed");
                    }
                }
            }
        });

        Self {
            viewed: ViewedSet::default(),
            reports,
        }
    }

    pub fn viewed(&self) -> &ViewedSet {
        &self.viewed
    }

    /// Record that a design became visible. Schedules a report and returns
    /// true only the first time per session.
    pub fn item_visible(&self, design_id: &str) -> bool {
        if !self.viewed.insert(design_id) {
            return false;
        }
        self.reports.call(design_id.to_string(), ());
        true
    }

    /// Report `design_id` once `visibility` first turns true. The task ends
    /// quietly if the observation is dropped before that.
    pub fn watch(
        self: &Arc<Self>,
        design_id: String,
        mut visibility: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let reporter = Arc::clone(self);
        tokio::spawn(async move {
            if visibility.wait_for(|visible| *visible).await.is_ok() {
                reporter.item_visible(&design_id);
            }
        })
    }

    pub fn pending_reports(&self) -> usize {
        self.reports.pending_len()
    }

    /// Send every scheduled report now.
    pub async fn flush(&self) -> usize {
        self.reports.flush_all().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::testing::FakeTransport;

    const VIEW_ROUTE: &str = "POST /api/designs/1/view";

    fn reporter() -> (Arc<FakeTransport>, Arc<EngagementReporter>) {
        let transport = FakeTransport::new();
        transport.respond(VIEW_ROUTE, Ok(json!({"success": true, "views": 11})));
        let reporter =
            EngagementReporter::new(PortfolioApi::new(transport.clone()), DEFAULT_VIEW_DEBOUNCE);
        (transport, Arc::new(reporter))
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_visibility_reports_once() {
        let (transport, reporter) = reporter();

        assert!(reporter.item_visible("1"));
        for _ in 0..9 {
            assert!(!reporter.item_visible("1"));
            tokio::time::sleep(Duration::from_millis(700)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(transport.calls(VIEW_ROUTE), 1);
        assert!(reporter.viewed().contains("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn report_waits_for_debounce_window() {
        let (transport, reporter) = reporter();

        reporter.item_visible("1");
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(transport.calls(VIEW_ROUTE), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(transport.calls(VIEW_ROUTE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_report_is_not_retried_nor_forgotten() {
        let transport = FakeTransport::new();
        let reporter = EngagementReporter::new(
            PortfolioApi::new(transport.clone()),
            Duration::from_millis(10),
        );

        reporter.item_visible("1");
        tokio::time::sleep(Duration::from_millis(50)).await;
        reporter.item_visible("1");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(transport.calls(VIEW_ROUTE), 1);
        assert!(reporter.viewed().contains("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_reports_when_visibility_flips() {
        let (transport, reporter) = reporter();
        let (notify, visibility) = watch::channel(false);

        let task = reporter.watch("1".to_string(), visibility);
        notify.send_replace(true);
        task.await.expect("watcher");
        assert_eq!(reporter.pending_reports(), 1);

        assert_eq!(reporter.flush().await, 1);
        assert_eq!(transport.calls(VIEW_ROUTE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_ends_when_observation_is_dropped() {
        let (transport, reporter) = reporter();
        let (notify, visibility) = watch::channel(false);

        let task = reporter.watch("1".to_string(), visibility);
        drop(notify);
        task.await.expect("watcher");

        assert!(reporter.viewed().is_empty());
        assert_eq!(transport.calls(VIEW_ROUTE), 0);
    }
}
