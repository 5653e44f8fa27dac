use async_trait::async_trait;
use cocoon_core::{Article, Result, SourceConfig, SourceKind};
use scraper::{ElementRef, Html};
use std::time::Duration;

use crate::http::PoliteClient;
use crate::sources::utils::{clean_text, select_first, selector, to_article, truncate_chars};
use crate::sources::Source;

const BASE_URL: &str = "https://www.baidu.com";
const SEARCH_URL: &str = "https://www.baidu.com/s";
const SNIPPET_FALLBACK_CHARS: usize = 200;

pub struct BaiduSource {
    http: PoliteClient,
    max_results: usize,
    timeout: Duration,
}

impl BaiduSource {
    pub fn new(http: PoliteClient, config: &SourceConfig) -> Self {
        Self {
            http,
            max_results: config.max_results,
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Source for BaiduSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Baidu
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
        // Baidu serves a captcha page to cookie-less sessions.
        self.http.visit(BASE_URL).await;

        let query = [
            ("wd", keyword.to_string()),
            ("pn", "0".to_string()),
            ("ie", "utf-8".to_string()),
            ("rn", max_results.to_string()),
        ];
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

fn resolve_url(href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        Some(href.to_string())
    } else if href.starts_with('/') {
        Some(format!("{}{}", BASE_URL, href))
    } else {
        None
    }
}

/// Extracts results from a Baidu result page.
pub fn parse_results(html: &str, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
    let document = Html::parse_document(html);
    let primary = selector(".result.c-container")?;
    let fallback = selector(r#"div[class*="result"]"#)?;
    let link = selector("h3 a")?;
    let titles = [selector("h3 a")?, selector("h3")?];
    let snippets = [
        selector(".c-abstract")?,
        selector(r#"div[class*="content-"]"#)?,
        selector(".op-se-it-content")?,
    ];

    let mut items: Vec<ElementRef> = document.select(&primary).collect();
    if items.is_empty() {
        items = document.select(&fallback).collect();
    }

    let mut articles: Vec<Article> = Vec::new();
    for item in items {
        if articles.len() >= max_results {
            break;
        }

        let Some(title_el) = select_first(&item, &titles) else {
            continue;
        };
        let title = clean_text(&title_el);
        if title.is_empty() {
            continue;
        }
        let Some(url) = item
            .select(&link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(resolve_url)
        else {
            continue;
        };

        let snippet = select_first(&item, &snippets)
            .map(|el| clean_text(&el))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| {
                let full = clean_text(&item);
                truncate_chars(full.replacen(&title, "", 1).trim(), SNIPPET_FALLBACK_CHARS)
            });

        if let Some(article) = to_article(&url, &title, &snippet, SourceKind::Baidu, keyword) {
            if !articles.iter().any(|a| a.url == article.url) {
                articles.push(article);
            }
        }
    }
    Ok(articles)
}
