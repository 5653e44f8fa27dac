use async_trait::async_trait;
use cocoon_core::{Article, Result, SourceConfig, SourceKind};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::Html;
use std::time::Duration;

use crate::http::PoliteClient;
use crate::sources::utils::{clean_text, selector, to_article};
use crate::sources::Source;

const HOME_URL: &str = "https://search.yahoo.com/";
const SEARCH_URL: &str = "https://search.yahoo.com/search";
const MIN_SNIPPET_CHARS: usize = 20;
const NO_SNIPPET: &str = "无摘要";

lazy_static! {
    static ref REDIRECT_TARGET: Regex = Regex::new(r"/RU=([^/]+)/").expect("valid regex");
}

pub struct YahooSource {
    http: PoliteClient,
    max_results: usize,
    timeout: Duration,
}

impl YahooSource {
    pub fn new(http: PoliteClient, config: &SourceConfig) -> Self {
        Self {
            http,
            max_results: config.max_results,
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Source for YahooSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Yahoo
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
        self.http.visit(HOME_URL).await;

        let query = [("p", keyword.to_string()), ("n", max_results.to_string())];
        let html = self.http.get_text(SEARCH_URL, &query).await?;
        let articles = parse_results(&html, keyword, max_results)?;

        self.http
            .logger()
            .clone()
            .with_prefix(keyword)
            .info(&format!("🔍 Found {} results", articles.len()));
        Ok(articles)
    }
}

/// Unwraps `r.search.yahoo.com/.../RU=<encoded>/...` click-tracking links.
fn decode_redirect(href: &str) -> Option<String> {
    let encoded = REDIRECT_TARGET.captures(href)?.get(1)?.as_str();
    url::form_urlencoded::parse(format!("u={}", encoded).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
}

/// Extracts results from a Yahoo result page.
pub fn parse_results(html: &str, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
    let document = Html::parse_document(html);
    let items = selector("div.algo-sr")?;
    let heading = selector("h3")?;
    let links = selector("a[href]")?;
    let snippets = [
        selector("span.fc-falcon")?,
        selector("p.fz-ms")?,
        selector("p")?,
        selector("span.d-b")?,
    ];

    let mut articles = Vec::new();
    for item in document.select(&items) {
        if articles.len() >= max_results {
            break;
        }

        let Some(title) = item.select(&heading).next().map(|h| clean_text(&h)) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }

        let url = item
            .select(&links)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| {
                if href.contains("r.search.yahoo.com") {
                    decode_redirect(href)
                } else if href.starts_with("http") && !href.contains("yahoo.com") {
                    Some(href.to_string())
                } else {
                    None
                }
            });
        let Some(url) = url else {
            continue;
        };

        // Only the first match of each selector is considered.
        let snippet = snippets
            .iter()
            .filter_map(|s| item.select(s).next())
            .map(|el| clean_text(&el))
            .find(|text| text.chars().count() > MIN_SNIPPET_CHARS)
            .unwrap_or_else(|| NO_SNIPPET.to_string());

        if let Some(article) = to_article(&url, &title, &snippet, SourceKind::Yahoo, keyword) {
            articles.push(article);
        }
    }
    Ok(articles)
}
