//! Typed calls against the portfolio API.

use std::sync::Arc;

use atelier_api_types::{
    ANALYTICS_PATH, AnalyticsRecord, DESIGN_STATS_PATH, DESIGNS_PATH, Design, DesignStats,
    LikeAction, LikeRequest, LikeResponse, ViewResponse, design_like_path, design_view_path,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::application::error::FetchError;
use crate::application::ports::HttpTransport;

#[derive(Clone)]
pub struct PortfolioApi {
    transport: Arc<dyn HttpTransport>,
}

impl PortfolioApi {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    pub async fn designs(&self) -> Result<Vec<Design>, FetchError> {
        decode(self.transport.get_json(DESIGNS_PATH).await?)
    }

    pub async fn design_stats(&self) -> Result<Vec<DesignStats>, FetchError> {
        decode(self.transport.get_json(DESIGN_STATS_PATH).await?)
    }

    pub async fn analytics(&self) -> Result<Vec<AnalyticsRecord>, FetchError> {
        decode(self.transport.get_json(ANALYTICS_PATH).await?)
    }

    /// A 2xx body with `success: false` is reported as [`FetchError::Rejected`].
    pub async fn report_like(
        &self,
        design_id: &str,
        action: LikeAction,
    ) -> Result<LikeResponse, FetchError> {
        let body = serde_json::to_value(LikeRequest { action }).map_err(FetchError::decode)?;
        let response: LikeResponse = decode(
            self.transport
                .post_json(&design_like_path(design_id), Some(body))
                .await?,
        )?;
        if response.success {
            Ok(response)
        } else {
            Err(FetchError::rejected(format!("{action} of design {design_id}")))
        }
    }

    pub async fn report_view(&self, design_id: &str) -> Result<ViewResponse, FetchError> {
        let response: ViewResponse = decode(
            self.transport
                .post_json(&design_view_path(design_id), None)
                .await?,
        )?;
        if response.success {
            Ok(response)
        } else {
            Err(FetchError::rejected(format!("view of design {design_id}")))
        }
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(FetchError::decode)
}
