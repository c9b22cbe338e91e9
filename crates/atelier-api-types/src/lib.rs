//! Wire types shared between the Atelier gallery client and the portfolio API.
//!
//! Field names follow the JSON produced by the portfolio routes, which use the
//! document database's `_id` and camelCase keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const DESIGNS_PATH: &str = "/api/designs";
pub const DESIGN_STATS_PATH: &str = "/api/designs/stats";
pub const ANALYTICS_PATH: &str = "/api/analytics";

/// Path of the like endpoint for a single design.
pub fn design_like_path(id: &str) -> String {
    format!("{DESIGNS_PATH}/{id}/like")
}

/// Path of the view endpoint for a single design.
pub fn design_view_path(id: &str) -> String {
    format!("{DESIGNS_PATH}/{id}/view")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignStatus {
    Published,
    Draft,
}

/// Portfolio entry as returned by `GET /api/designs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Design {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub views: u64,
    pub status: DesignStatus,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// Counter projection returned by `GET /api/designs/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignStats {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub views: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    /// Action that moves an item into the `liked` membership state.
    pub fn towards(liked: bool) -> Self {
        if liked { Self::Like } else { Self::Unlike }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Unlike => "unlike",
        }
    }
}

impl fmt::Display for LikeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRequest {
    pub action: LikeAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResponse {
    pub success: bool,
    #[serde(default)]
    pub likes: u64,
    pub action: Option<LikeAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewResponse {
    pub success: bool,
    #[serde(default)]
    pub views: u64,
}

/// One bucket of the analytics aggregation: interactions of a type on a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionBucket {
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    pub count: u64,
}

/// Per-design analytics returned by `GET /api/analytics`, sorted by views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    #[serde(rename = "_id")]
    pub design_id: String,
    #[serde(default)]
    pub interactions: Vec<InteractionBucket>,
    #[serde(default)]
    pub total_likes: u64,
    #[serde(default)]
    pub total_views: u64,
}

/// Body of a failing route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
