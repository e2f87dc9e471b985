//! # Query Context
//! Immutable description of one unit of work: the idea under validation,
//! optional filters, and the tile type that selects the fetch/normalize path.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Look-back window requested by the dashboard filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Quarter => "quarter",
            TimeWindow::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub idea_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geography: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    pub tile_type: String,
}

impl QueryContext {
    pub fn new(idea_text: impl Into<String>, tile_type: impl Into<String>) -> Self {
        Self {
            idea_text: idea_text.into(),
            tile_type: tile_type.into(),
            ..Self::default()
        }
    }

    pub fn industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn geography(mut self, geography: impl Into<String>) -> Self {
        self.geography = Some(geography.into());
        self
    }

    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    /// Same query re-targeted at another tile (used by the fan-out).
    pub fn for_tile(&self, tile_type: &str) -> Self {
        Self {
            tile_type: tile_type.to_string(),
            ..self.clone()
        }
    }

    /// Reject queries that cannot identify a unit of work.
    /// Blank optional filters are dropped so they never reach fetchers or keys.
    pub fn validate(mut self) -> Result<Self> {
        if self.idea_text.trim().is_empty() {
            return Err(PipelineError::configuration("idea text must not be empty"));
        }
        if self.tile_type.trim().is_empty() {
            return Err(PipelineError::configuration("tile type must not be empty"));
        }
        self.tile_type = self.tile_type.trim().to_ascii_lowercase();
        self.industry = non_blank(self.industry);
        self.geography = non_blank(self.geography);
        Ok(self)
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Consumer-requested ordering of tile items. Upstream order is relevance order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Relevance,
    Recency,
}
