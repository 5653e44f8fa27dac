use async_trait::async_trait;
use cocoon_core::{Article, Result, SourceConfig, SourceKind};
use scraper::{ElementRef, Html};
use std::time::Duration;

use crate::http::PoliteClient;
use crate::sources::utils::{clean_text, select_first, selector, to_article};
use crate::sources::Source;

const HOME_URL: &str = "https://cn.bing.com/";
const SEARCH_URL: &str = "https://cn.bing.com/search";

pub struct BingSource {
    http: PoliteClient,
    max_results: usize,
    timeout: Duration,
}

impl BingSource {
    pub fn new(http: PoliteClient, config: &SourceConfig) -> Self {
        Self {
            http,
            max_results: config.max_results,
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Source for BingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Bing
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn fetch(&self, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
        self.http.visit(HOME_URL).await;

        let query = [
            ("q", keyword.to_string()),
            ("count", max_results.to_string()),
            ("mkt", "zh-CN".to_string()),
            ("setlang", "zh-hans".to_string()),
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

fn is_ad(item: &ElementRef) -> bool {
    item.value()
        .classes()
        .any(|class| class == "b_ad" || class.starts_with("b_ans"))
}

fn is_external(url: &str) -> bool {
    url.starts_with("http") && !url.contains("bing.com/ck/ms") && !url.contains("microsoft.com")
}

/// Extracts organic results from a Bing result page.
pub fn parse_results(html: &str, keyword: &str, max_results: usize) -> Result<Vec<Article>> {
    let document = Html::parse_document(html);
    let containers = [
        selector("ol#b_results > li.b_algo")?,
        selector("li.b_algo")?,
        selector(".b_algo")?,
    ];
    let ad_marker = selector(".b_ad")?;
    let titles = [selector("h2 a")?, selector("h2")?];
    let link = selector("a[href]")?;
    let snippets = [
        selector(".b_caption p")?,
        selector(".b_algoSnippet")?,
        selector(".b_content p")?,
        selector(".b_caption")?,
    ];

    let items: Vec<ElementRef> = containers
        .iter()
        .map(|s| document.select(s).collect::<Vec<_>>())
        .find(|items| !items.is_empty())
        .unwrap_or_default();

    let mut articles = Vec::new();
    for item in items {
        if articles.len() >= max_results {
            break;
        }
        if is_ad(&item) || item.select(&ad_marker).next().is_some() {
            continue;
        }

        let Some(title_el) = select_first(&item, &titles) else {
            continue;
        };
        let title = clean_text(&title_el);
        if title.chars().count() < 2 {
            continue;
        }
        let Some(url) = item.select(&link).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        if !is_external(url) {
            continue;
        }

        let snippet = select_first(&item, &snippets)
            .map(|el| clean_text(&el))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| title.clone());

        if let Some(article) = to_article(url, &title, &snippet, SourceKind::Bing, keyword) {
            articles.push(article);
        }
    }
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
        <html><body>
        <ol id="b_results">
          <li class="b_algo">
            <h2><a href="https://www.example.com/ai-news?utm_source=bing">AI 行业周报</a></h2>
            <div class="b_caption"><p>本周 AI 行业 融资 动态汇总。</p></div>
          </li>
          <li class="b_algo b_ad">
            <h2><a href="https://ads.example.com/">广告</a></h2>
          </li>
          <li class="b_algo">
            <div class="b_ad"><h2><a href="https://ads2.example.com/">嵌入广告</a></h2></div>
          </li>
          <li class="b_ans"><h2><a href="https://answers.example.com/">答案卡片</a></h2></li>
          <li class="b_algo">
            <h2><a href="https://www.bing.com/ck/ms?u=abc">跳转链接</a></h2>
          </li>
          <li class="b_algo">
            <h2><a href="https://learn.microsoft.com/ai">微软文档</a></h2>
          </li>
          <li class="b_algo">
            <h2><a href="https://news.example.org/2">X</a></h2>
          </li>
          <li class="b_algo">
            <h2><a href="https://news.example.org/3">无摘要条目</a></h2>
          </li>
        </ol>
        </body></html>
    "#;

    #[test]
    fn test_parse_results_filters_ads_and_internal_links() {
        let articles = parse_results(RESULTS_PAGE, "AI", 10).unwrap();
        let urls: Vec<_> = articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.example.com/ai-news", "https://news.example.org/3"]
        );
        assert_eq!(articles[0].title, "AI 行业周报");
        assert_eq!(articles[0].content, "本周 AI 行业 融资 动态汇总。");
        assert_eq!(articles[1].content, "无摘要条目");
    }

    #[test]
    fn test_parse_respects_max_results() {
        assert_eq!(parse_results(RESULTS_PAGE, "AI", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_container_fallback() {
        let html = r#"<div class="b_algo"><h2><a href="https://example.com/x">Loose result</a></h2></div>"#;
        let articles = parse_results(html, "AI", 10).unwrap();
        assert_eq!(articles.len(), 1);
    }
}
