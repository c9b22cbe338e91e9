//! Engagement totals derived from `/api/analytics`.

use std::sync::Arc;
use std::time::Duration;

use atelier_api_types::{AnalyticsRecord, Design};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::api::PortfolioApi;
use crate::application::error::FetchError;

pub const DEFAULT_SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDesign {
    pub design_id: Option<String>,
    pub title: Option<String>,
    pub views: u64,
    pub likes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub total_views: u64,
    pub total_likes: u64,
    pub total_interactions: u64,
    pub top_design: TopDesign,
}

impl EngagementSummary {
    /// Records arrive sorted by views, so the first one is the top design.
    pub fn from_records(records: &[AnalyticsRecord]) -> Self {
        let total_views = records.iter().map(|r| r.total_views).sum::<u64>();
        let total_likes = records.iter().map(|r| r.total_likes).sum::<u64>();
        let top_design = records
            .first()
            .map(|top| TopDesign {
                design_id: Some(top.design_id.clone()),
                title: None,
                views: top.total_views,
                likes: top.total_likes,
            })
            .unwrap_or_default();

        Self {
            total_views,
            total_likes,
            total_interactions: total_views + total_likes,
            top_design,
        }
    }

    /// Fill in the top design's title from a loaded design list.
    pub fn with_titles(mut self, designs: &[Design]) -> Self {
        if let Some(id) = self.top_design.design_id.as_deref() {
            self.top_design.title = designs
                .iter()
                .find(|design| design.id == id)
                .map(|design| design.title.clone());
        }
        self
    }
}

/// Keeps the latest [`EngagementSummary`] published on a watch channel.
pub struct SummaryPoller {
    api: PortfolioApi,
    latest: watch::Sender<Option<EngagementSummary>>,
}

impl SummaryPoller {
    pub fn new(api: PortfolioApi) -> Self {
        let (latest, _) = watch::channel(None);
        Self { api, latest }
    }

    pub async fn poll(&self) -> Result<EngagementSummary, FetchError> {
        let records = self.api.analytics().await?;
        let summary = EngagementSummary::from_records(&records);
        debug!(
            designs = records.len(),
            total_interactions = summary.total_interactions,
            "Engagement summary updated"
        );
        self.latest.send_replace(Some(summary.clone()));
        Ok(summary)
    }

    pub fn latest(&self) -> Option<EngagementSummary> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<EngagementSummary>> {
        self.latest.subscribe()
    }

    /// Poll now and then every `every`. Failures keep the previous summary.
    pub fn spawn(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(err) = poller.poll().await {
                    warn!(error = %err, "Engagement summary poll failed");
                }
            }
        })
    }
}
