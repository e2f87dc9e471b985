//! Upstream data sources and which tiles they feed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tile::TileKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    Reddit,
    Twitter,
    #[serde(rename = "youtube")]
    YouTube,
    News,
    WebSearch,
    /// LLM synthesis endpoint (PMF scoring and other generated tiles).
    Llm,
}

/// Sources blended by the unified sentiment tile.
pub const SENTIMENT_SOURCES: [SourceName; 4] = [
    SourceName::Reddit,
    SourceName::Twitter,
    SourceName::YouTube,
    SourceName::News,
];

impl SourceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Reddit => "reddit",
            SourceName::Twitter => "twitter",
            SourceName::YouTube => "youtube",
            SourceName::News => "news",
            SourceName::WebSearch => "web_search",
            SourceName::Llm => "llm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Some(SourceName::Reddit),
            "twitter" | "x" => Some(SourceName::Twitter),
            "youtube" => Some(SourceName::YouTube),
            "news" | "gdelt" => Some(SourceName::News),
            "web_search" | "serpapi" | "search" => Some(SourceName::WebSearch),
            "llm" | "groq" | "openai" => Some(SourceName::Llm),
            _ => None,
        }
    }

    /// Human label used in cluster themes and citations.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceName::Reddit => "Reddit",
            SourceName::Twitter => "Twitter/X",
            SourceName::YouTube => "YouTube",
            SourceName::News => "News",
            SourceName::WebSearch => "Web",
            SourceName::Llm => "AI analysis",
        }
    }

    /// Sources a tile kind pulls from. Unknown tiles go to the LLM endpoint.
    pub fn for_tile(kind: &TileKind) -> Vec<SourceName> {
        match kind {
            TileKind::Reddit => vec![SourceName::Reddit],
            TileKind::YouTube => vec![SourceName::YouTube],
            TileKind::News => vec![SourceName::News],
            TileKind::WebSearch => vec![SourceName::WebSearch],
            TileKind::Sentiment => SENTIMENT_SOURCES.to_vec(),
            TileKind::PmfScore | TileKind::Other(_) => vec![SourceName::Llm],
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_tile_fans_out_to_four_sources() {
        let s = SourceName::for_tile(&TileKind::Sentiment);
        assert_eq!(s.len(), 4);
        assert_eq!(SourceName::for_tile(&TileKind::PmfScore), vec![SourceName::Llm]);
    }

    #[test]
    fn names_round_trip() {
        for s in SENTIMENT_SOURCES {
            assert_eq!(SourceName::parse(s.as_str()), Some(s));
            assert_eq!(serde_json::to_value(s).unwrap(), s.as_str());
        }
    }
}
