//! RSS/Atom adapters. Feeds are not searchable, so each fetch downloads the
//! whole feed and keeps the entries mentioning the keyword.

use async_trait::async_trait;
use cocoon_core::{Article, Error, Result, SourceConfig, SourceKind};
use feed_rs::parser;
use std::io::Cursor;
use std::time::Duration;

use crate::http::PoliteClient;
use crate::sources::utils::{collapse_whitespace, strip_html, to_article};
use crate::sources::Source;

pub const KR36_FEED_URL: &str = "https://36kr.com/feed";
pub const HUXIU_FEED_URL: &str = "https://www.huxiu.com/rss/0.xml";

pub struct FeedSource {
    kind: SourceKind,
    feed_url: String,
    http: PoliteClient,
    max_results: usize,
    timeout: Duration,
}

impl FeedSource {
    pub fn new(kind: SourceKind, http: PoliteClient, config: &SourceConfig) -> Result<Self> {
        let default_url = match kind {
            SourceKind::Kr36 => KR36_FEED_URL,
            SourceKind::Huxiu => HUXIU_FEED_URL,
            other => {
                return Err(Error::Config(format!("{} is not a feed source", other)));
            }
        };
        Ok(Self {
            kind,
            feed_url: config
                .feed_url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            http,
            max_results: config.max_results,
            timeout: config.timeout(),
        })
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }
}

#[async_trait]
impl Source for FeedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
        let body = self.http.get_text(&self.feed_url, &[]).await?;
        let articles = parse_feed(body.as_bytes(), self.kind, keyword, max_results)?;

        self.http
            .logger()
            .clone()
            .with_prefix(keyword)
            .info(&format!("📰 {} matching entries", articles.len()));
        Ok(articles)
    }
}

/// Keeps the entries whose title or description contains `keyword`,
/// ignoring case, stopping after `max_results` matches.
pub fn parse_feed(
    body: &[u8],
    kind: SourceKind,
    keyword: &str,
    max_results: usize,
) -> Result<Vec<Article>> {
    let feed = parser::parse(Cursor::new(body))
        .map_err(|e| Error::Parse(format!("Invalid {} feed: {}", kind, e)))?;
    let needle = keyword.to_lowercase();

    let mut articles = Vec::new();
    for entry in feed.entries {
        if articles.len() >= max_results {
            break;
        }

        let title = entry
            .title
            .map(|t| collapse_whitespace(&t.content))
            .unwrap_or_default();
        let description = entry
            .summary
            .map(|t| t.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|html| strip_html(&html))
            .unwrap_or_default();

        if !title.to_lowercase().contains(&needle) && !description.to_lowercase().contains(&needle)
        {
            continue;
        }
        let Some(link) = entry.links.first() else {
            continue;
        };

        let content = if description.is_empty() {
            title.clone()
        } else {
            description
        };
        let published_at = entry.published.or(entry.updated);

        if let Some(article) = to_article(&link.href, &title, &content, kind, keyword) {
            articles.push(article.with_published_at(published_at));
        }
    }
    Ok(articles)
}
