use async_trait::async_trait;
use cocoon_core::{Article, Error, Result, SourceConfig, SourceKind};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::http::PoliteClient;
use crate::sources::utils::to_article;
use crate::sources::Source;

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
/// The Custom Search API returns at most ten items per request.
const MAX_PER_REQUEST: usize = 10;
const INTERNAL_LINKS: &[&str] = &["google.com/search", "accounts.google", "support.google"];
const NO_SNIPPET: &str = "无摘要";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

pub struct GoogleSource {
    http: PoliteClient,
    api_key: Option<String>,
    search_engine_id: Option<String>,
    max_results: usize,
    timeout: Duration,
}

impl GoogleSource {
    pub fn new(http: PoliteClient, config: &SourceConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            search_engine_id: config.search_engine_id.clone().filter(|k| !k.is_empty()),
            max_results: config.max_results,
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Source for GoogleSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Google
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
        let (Some(api_key), Some(cx)) = (&self.api_key, &self.search_engine_id) else {
            return Err(Error::Config(
                "google requires api_key and search_engine_id".to_string(),
            ));
        };

        let query = [
            ("key", api_key.clone()),
            ("cx", cx.clone()),
            ("q", keyword.to_string()),
            ("num", max_results.min(MAX_PER_REQUEST).to_string()),
            ("lr", "lang_zh-CN".to_string()),
        ];
        let query = &query;

        // Only server-side failures are retried; quota and auth errors are final.
        let (status, body) = self
            .http
            .with_retry(|| async move {
                let (status, body) = self.http.get_once(SEARCH_URL, query).await?;
                if status.is_server_error() {
                    return Err(Error::Source(format!("HTTP {} from Google API", status)));
                }
                Ok((status, body))
            })
            .await?;

        let articles = parse_response(status, &body, keyword, max_results)?;
        self.http
            .logger()
            .clone()
            .with_prefix(keyword)
            .info(&format!("🔍 Found {} results", articles.len()));
        Ok(articles)
    }
}

/// Maps a Custom Search API answer to articles. API `error` objects become
/// source errors.
pub fn parse_response(
    status: StatusCode,
    body: &str,
    keyword: &str,
    max_results: usize,
) -> Result<Vec<Article>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Invalid Google API response ({}): {}", status, e)))?;

    if let Some(error) = response.error {
        let code = error
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        return Err(Error::Source(format!("Google API error [{}]: {}", code, error.message)));
    }
    if !status.is_success() {
        return Err(Error::Source(format!("HTTP {} from Google API", status)));
    }

    Ok(response
        .items
        .into_iter()
        .filter(|item| !item.title.trim().is_empty() && !item.link.is_empty())
        .filter(|item| !INTERNAL_LINKS.iter().any(|internal| item.link.contains(internal)))
        .filter_map(|item| {
            let snippet = if item.snippet.trim().is_empty() {
                NO_SNIPPET
            } else {
                item.snippet.as_str()
            };
            to_article(&item.link, &item.title, snippet, SourceKind::Google, keyword)
        })
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    const RESPONSE: &str = r#"{
        "kind": "customsearch#search",
        "items": [
            {"title": " AI 政策解读 ", "link": "https://gov.example.cn/ai", "snippet": "国务院发布人工智能发展规划。"},
            {"title": "Sign in", "link": "https://accounts.google.com/signin"},
            {"title": "Empty snippet", "link": "https://example.com/empty", "snippet": ""},
            {"title": "", "link": "https://example.com/untitled"}
        ]
    }"#;

    #[test]
    fn test_parse_response() {
        let articles = parse_response(StatusCode::OK, RESPONSE, "AI", 10).unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "AI 政策解读");
        assert_eq!(articles[0].source, SourceKind::Google);
        assert_eq!(articles[1].content, NO_SNIPPET);
    }

    #[test]
    fn test_api_error_is_source_error() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded"}}"#;
        match parse_response(StatusCode::TOO_MANY_REQUESTS, body, "AI", 10) {
            Err(Error::Source(message)) => {
                assert!(message.contains("429"));
                assert!(message.contains("Quota exceeded"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_items_is_empty() {
        let articles = parse_response(StatusCode::OK, r#"{"kind": "x"}"#, "AI", 10).unwrap();
        assert!(articles.is_empty());
        assert!(parse_response(StatusCode::OK, "<html>", "AI", 10).is_err());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let config = SourceConfig::default();
        let http = PoliteClient::new(Client::new(), SourceKind::Google, &config);
        let source = GoogleSource::new(http, &config);
        assert!(matches!(source.fetch("AI", 10).await, Err(Error::Config(_))));
    }
}
