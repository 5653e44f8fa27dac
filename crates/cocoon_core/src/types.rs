use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::canonical::canonicalize_url;
use crate::{Error, Result};

/// Maximum number of characters kept in `Article::content`.
pub const CONTENT_MAX_CHARS: usize = 1000;

const ELLIPSIS: &str = "...";

/// The fixed set of adapters an article can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "baidu")]
    Baidu,
    #[serde(rename = "bing")]
    Bing,
    #[serde(rename = "yahoo")]
    Yahoo,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "tavily")]
    Tavily,
    #[serde(rename = "36kr")]
    Kr36,
    #[serde(rename = "huxiu")]
    Huxiu,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::Baidu,
        SourceKind::Bing,
        SourceKind::Yahoo,
        SourceKind::Google,
        SourceKind::Tavily,
        SourceKind::Kr36,
        SourceKind::Huxiu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Baidu => "baidu",
            SourceKind::Bing => "bing",
            SourceKind::Yahoo => "yahoo",
            SourceKind::Google => "google",
            SourceKind::Tavily => "tavily",
            SourceKind::Kr36 => "36kr",
            SourceKind::Huxiu => "huxiu",
        }
    }

    /// Sources queried through a search API rather than scraped. Their results
    /// get the quality boost when ranking.
    pub fn is_high_trust(&self) -> bool {
        matches!(self, SourceKind::Google | SourceKind::Tavily)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Parse(format!("Unknown source: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Insertion sequence number, assigned by the store.
    pub id: Option<i64>,
    pub url: String,
    pub title: String,
    pub content: String,
    pub source: SourceKind,
    pub keyword: String,
    pub crawled_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Builds an article observed now. The URL is canonicalized and the content
    /// truncated to `CONTENT_MAX_CHARS`.
    pub fn new(
        url: &str,
        title: impl Into<String>,
        content: impl Into<String>,
        source: SourceKind,
        keyword: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            id: None,
            url: canonicalize_url(url)?,
            title: title.into().trim().to_string(),
            content: truncate_content(content.into().trim()),
            source,
            keyword: keyword.into(),
            crawled_at: Utc::now(),
            published_at: None,
        })
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Cuts `content` so that it holds at most `CONTENT_MAX_CHARS` characters,
/// ellipsis included.
pub fn truncate_content(content: &str) -> String {
    if content.chars().count() <= CONTENT_MAX_CHARS {
        return content.to_string();
    }
    let mut truncated: String = content
        .chars()
        .take(CONTENT_MAX_CHARS - ELLIPSIS.len())
        .collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// An article projected with its ranking scores. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredArticle {
    pub article: Article,
    pub quality_score: f64,
    pub freshness_score: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub keyword: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}
