use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cocoon_core::{Article, Error, Result, SourceConfig, SourceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::PoliteClient;
use crate::sources::utils::to_article;
use crate::sources::Source;

const SEARCH_URL: &str = "https://api.tavily.com/search";
const DEFAULT_SEARCH_DEPTH: &str = "advanced";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    published_date: Option<String>,
}

pub struct TavilySource {
    http: PoliteClient,
    api_key: Option<String>,
    search_depth: String,
    max_results: usize,
    timeout: Duration,
}

impl TavilySource {
    pub fn new(http: PoliteClient, config: &SourceConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            search_depth: config
                .search_depth
                .clone()
                .unwrap_or_else(|| DEFAULT_SEARCH_DEPTH.to_string()),
            max_results: config.max_results,
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Source for TavilySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Tavily
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(Error::Config("tavily requires api_key".to_string()));
        };
        let request = SearchRequest {
            api_key,
            query: keyword,
            search_depth: &self.search_depth,
            max_results,
        };
        let request = &request;

        let body = self
            .http
            .with_retry(|| async move {
                let (status, body) = self.http.post_json_once(SEARCH_URL, request).await?;
                if !status.is_success() {
                    return Err(Error::Source(format!("HTTP {} from Tavily", status)));
                }
                Ok(body)
            })
            .await?;

        let articles = parse_response(&body, keyword, max_results)?;
        self.http
            .logger()
            .clone()
            .with_prefix(keyword)
            .info(&format!("🔍 Found {} results", articles.len()));
        Ok(articles)
    }
}

fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

/// Maps a Tavily search answer to articles.
pub fn parse_response(body: &str, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Invalid Tavily response: {}", e)))?;

    Ok(response
        .results
        .into_iter()
        .filter(|r| !r.title.trim().is_empty() && !r.url.is_empty())
        .filter_map(|r| {
            let published_at = r.published_date.as_deref().and_then(parse_published);
            to_article(&r.url, &r.title, &r.content, SourceKind::Tavily, keyword)
                .map(|article| article.with_published_at(published_at))
        })
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "query": "AI",
            "results": [
                {"title": "AI agents", "url": "https://example.com/agents", "content": "Agents everywhere.", "score": 0.9,
                 "published_date": "Tue, 14 May 2024 08:00:00 GMT"},
                {"title": "No url", "url": ""},
                {"title": "Dated", "url": "https://example.com/dated", "content": "", "published_date": "2024-05-01"}
            ]
        }"#;
        let articles = parse_response(body, "AI", 10).unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source, SourceKind::Tavily);
        assert_eq!(articles[0].content, "Agents everywhere.");
        assert_eq!(
            articles[0].published_at.map(|d| d.to_rfc3339()),
            Some("2024-05-14T08:00:00+00:00".to_string())
        );
        assert!(articles[1].published_at.is_some());
    }

    #[test]
    fn test_request_shape() {
        let request = SearchRequest {
            api_key: "k",
            query: "AI",
            search_depth: DEFAULT_SEARCH_DEPTH,
            max_results: 5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["search_depth"], "advanced");
        assert_eq!(json["max_results"], 5);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = SourceConfig::default();
        let http = PoliteClient::new(Client::new(), SourceKind::Tavily, &config);
        let source = TavilySource::new(http, &config);
        assert!(matches!(source.fetch("AI", 5).await, Err(Error::Config(_))));
    }
}
