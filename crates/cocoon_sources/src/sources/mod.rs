use async_trait::async_trait;
use cocoon_core::{Article, Error, Result, SourceConfig, SourceKind, SourcesConfig};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::http::PoliteClient;

pub mod api;
pub mod feed;
pub mod search;

pub use api::google::GoogleSource;
pub use api::tavily::TavilySource;
pub use feed::FeedSource;
pub use search::baidu::BaiduSource;
pub use search::bing::BingSource;
pub use search::yahoo::YahooSource;

/// One upstream the pipeline can query for a keyword.
#[async_trait]
pub trait Source: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Budget for a whole `fetch`, enforced by the collector.
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn max_results(&self) -> usize {
        20
    }

    /// Returns at most `max_results` articles, in no particular order.
    async fn fetch(&self, keyword: &str, max_results: usize) -> Result<Vec<Article>>;
}

/// Builds the adapter for `kind` from its settings.
pub fn build_source(kind: SourceKind, config: &SourceConfig, client: &Client) -> Result<Arc<dyn Source>> {
    config.validate(kind)?;
    let http = PoliteClient::new(client.clone(), kind, config);
    let source: Arc<dyn Source> = match kind {
        SourceKind::Baidu => Arc::new(BaiduSource::new(http, config)),
        SourceKind::Bing => Arc::new(BingSource::new(http, config)),
        SourceKind::Yahoo => Arc::new(YahooSource::new(http, config)),
        SourceKind::Google => Arc::new(GoogleSource::new(http, config)),
        SourceKind::Tavily => Arc::new(TavilySource::new(http, config)),
        SourceKind::Kr36 | SourceKind::Huxiu => Arc::new(FeedSource::new(kind, http, config)?),
    };
    Ok(source)
}

/// Builds every enabled adapter, in `SourceKind` order.
pub fn build_sources(config: &SourcesConfig, client: &Client) -> Result<Vec<Arc<dyn Source>>> {
    config
        .enabled()
        .map(|(kind, source_config)| build_source(kind, source_config, client))
        .collect()
}

/// Shared HTML helpers.
pub(crate) mod utils {
    use super::*;
    use scraper::{ElementRef, Html, Selector};

    pub fn selector(css: &str) -> Result<Selector> {
        Selector::parse(css).map_err(|e| Error::Parse(format!("Invalid selector {}: {:?}", css, e)))
    }

    /// Text of an element with runs of whitespace collapsed.
    pub fn clean_text(element: &ElementRef) -> String {
        collapse_whitespace(&element.text().collect::<String>())
    }

    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Reduces an HTML fragment to its text.
    pub fn strip_html(fragment: &str) -> String {
        let html = Html::parse_fragment(fragment);
        collapse_whitespace(&html.root_element().text().collect::<String>())
    }

    /// First match of the first selector that matches anything.
    pub fn select_first<'a>(element: &ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
        selectors.iter().find_map(|s| element.select(s).next())
    }

    pub fn truncate_chars(text: &str, max: usize) -> String {
        text.chars().take(max).collect()
    }

    /// Builds an article, dropping results whose URL cannot be canonicalized.
    pub fn to_article(
        url: &str,
        title: &str,
        content: &str,
        kind: SourceKind,
        keyword: &str,
    ) -> Option<Article> {
        match Article::new(url, title, content, kind, keyword) {
            Ok(article) => Some(article),
            Err(e) => {
                tracing::debug!("[{}] Skipping result: {}", kind, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_build_sources_skips_disabled() {
        let mut config = SourcesConfig::default();
        for kind in SourceKind::ALL {
            config.insert(kind, SourceConfig::default());
        }
        config.insert(
            SourceKind::Yahoo,
            SourceConfig {
                enabled: false,
                ..SourceConfig::default()
            },
        );

        let sources = build_sources(&config, &Client::new()).unwrap();
        let kinds: Vec<_> = sources.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds.len(), 6);
        assert!(!kinds.contains(&SourceKind::Yahoo));
    }

    #[test]
    fn test_build_source_rejects_invalid_config() {
        let config = SourceConfig {
            max_attempts: 0,
            ..SourceConfig::default()
        };
        assert!(matches!(
            build_source(SourceKind::Bing, &config, &Client::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_sources_carry_their_limits() {
        let config = SourceConfig {
            max_results: 7,
            timeout_secs: 15,
            ..SourceConfig::default()
        };
        let source = build_source(SourceKind::Huxiu, &config, &Client::new()).unwrap();
        assert_eq!(source.max_results(), 7);
        assert_eq!(source.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_strip_html_and_whitespace() {
        assert_eq!(
            utils::strip_html("<p>Hello <b>AI</b>\n\n world</p>"),
            "Hello AI world"
        );
        let html = Html::parse_fragment("<div><span>  a \n b </span></div>");
        let span = html.select(&utils::selector("span").unwrap()).next().unwrap();
        assert_eq!(utils::clean_text(&span), "a b");
    }
}
