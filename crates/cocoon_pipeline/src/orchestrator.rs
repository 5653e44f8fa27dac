use chrono::{DateTime, Utc};
use cocoon_core::{ArticleStore, Error, Result, ScoredArticle, ScoringConfig, SourcesConfig};
use cocoon_sources::{build_sources, collect, AdapterReport, Source};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::scoring::ScoringEngine;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum KeywordStatus {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordReport {
    pub keyword: String,
    pub status: KeywordStatus,
    pub adapters: Vec<AdapterReport>,
    /// Raw results returned by the adapters, duplicates included.
    pub fetched: usize,
    pub new: usize,
    pub duplicates: usize,
    pub ranked: Vec<ScoredArticle>,
}

impl KeywordReport {
    fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            status: KeywordStatus::Completed,
            adapters: Vec::new(),
            fetched: 0,
            new: 0,
            duplicates: 0,
            ranked: Vec::new(),
        }
    }

    fn fail(mut self, error: &Error) -> Self {
        self.status = KeywordStatus::Failed(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per keyword, in input order.
    pub keywords: Vec<KeywordReport>,
}

impl RunReport {
    pub fn ranked(&self, keyword: &str) -> Option<&[ScoredArticle]> {
        self.keywords
            .iter()
            .find(|k| k.keyword == keyword)
            .map(|k| k.ranked.as_slice())
    }

    pub fn total_new(&self) -> usize {
        self.keywords.iter().map(|k| k.new).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &KeywordReport> {
        self.keywords
            .iter()
            .filter(|k| matches!(k.status, KeywordStatus::Failed(_)))
    }
}

/// Trims keywords, drops blanks and repeated entries, keeping first-seen order.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}

/// Collect, deduplicate, persist and rank for a set of keywords.
///
/// Holds no per-run state, so a single instance can serve concurrent runs.
pub struct Pipeline {
    store: Arc<dyn ArticleStore>,
    client: Client,
    keyword_concurrency: usize,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ArticleStore>, client: Client) -> Self {
        Self {
            store,
            client,
            keyword_concurrency: 1,
        }
    }

    pub fn with_keyword_concurrency(mut self, keyword_concurrency: usize) -> Self {
        self.keyword_concurrency = keyword_concurrency.max(1);
        self
    }

    /// Builds the enabled adapters from `sources` and runs every keyword.
    pub async fn run(
        &self,
        keywords: &[String],
        sources: &SourcesConfig,
        scoring: &ScoringConfig,
    ) -> Result<RunReport> {
        let adapters = build_sources(sources, &self.client)?;
        self.run_with_sources(keywords, &adapters, scoring).await
    }

    /// Per-keyword failures are recorded in the report. The run itself fails
    /// only on bad input or when every keyword failed.
    pub async fn run_with_sources(
        &self,
        keywords: &[String],
        sources: &[Arc<dyn Source>],
        scoring: &ScoringConfig,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let keywords = normalize_keywords(keywords);
        if keywords.is_empty() {
            return Err(Error::Config("no keywords to process".to_string()));
        }
        if sources.is_empty() {
            return Err(Error::Config("every source is disabled".to_string()));
        }
        scoring.validate()?;

        info!(
            "🚀 Starting run: {} keyword(s), {} source(s)",
            keywords.len(),
            sources.len()
        );

        let engine = ScoringEngine::new(self.store.clone());
        let engine = &engine;
        let reports: Vec<KeywordReport> = stream::iter(keywords.iter())
            .map(|keyword| self.process_keyword(keyword, sources, engine, scoring))
            .buffered(self.keyword_concurrency)
            .collect()
            .await;

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            keywords: reports,
        };
        if report.failed().count() == report.keywords.len() {
            let reasons: Vec<String> = report
                .keywords
                .iter()
                .filter_map(|k| match &k.status {
                    KeywordStatus::Failed(reason) => Some(format!("{}: {}", k.keyword, reason)),
                    KeywordStatus::Completed => None,
                })
                .collect();
            return Err(Error::Storage(format!(
                "no keyword could be processed ({})",
                reasons.join("; ")
            )));
        }

        info!(
            "✅ Run finished: {} new article(s), {} failed keyword(s)",
            report.total_new(),
            report.failed().count()
        );
        Ok(report)
    }

    async fn process_keyword(
        &self,
        keyword: &str,
        sources: &[Arc<dyn Source>],
        engine: &ScoringEngine,
        scoring: &ScoringConfig,
    ) -> KeywordReport {
        let mut report = KeywordReport::new(keyword);

        let collected = collect(sources, keyword).await;
        report.fetched = collected.fetched();
        report.adapters = collected.reports;

        for article in &collected.articles {
            match self.store.insert_if_new(article).await {
                Ok(true) => report.new += 1,
                Ok(false) => report.duplicates += 1,
                Err(e) => {
                    warn!("💾 [{}] Store unavailable, skipping keyword: {}", keyword, e);
                    return report.fail(&e);
                }
            }
        }

        match engine.rank(keyword, scoring).await {
            Ok(ranked) => report.ranked = ranked,
            Err(e) => {
                warn!("📉 [{}] Ranking failed: {}", keyword, e);
                return report.fail(&e);
            }
        }

        info!(
            "📰 [{}] fetched {}, new {}, duplicates {}, ranked {}",
            keyword,
            report.fetched,
            report.new,
            report.duplicates,
            report.ranked.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cocoon_core::{Article, SourceConfig, SourceKind};
    use cocoon_sources::AdapterStatus;
    use cocoon_storage::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct StaticSource {
        kind: SourceKind,
        urls: Vec<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl Source for StaticSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn fetch(&self, keyword: &str, _max_results: usize) -> Result<Vec<Article>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self
                .urls
                .iter()
                .map(|url| {
                    Article::new(url, format!("{} news", keyword), "body text", self.kind, keyword)
                        .unwrap()
                })
                .collect())
        }
    }

    fn source(kind: SourceKind, urls: Vec<&'static str>) -> Arc<dyn Source> {
        Arc::new(StaticSource {
            kind,
            urls,
            delay: Duration::ZERO,
        })
    }

    fn pipeline(store: Arc<dyn ArticleStore>) -> Pipeline {
        Pipeline::new(store, Client::new())
    }

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_adapters_one_timeout_one_overlap() {
        let store = Arc::new(MemoryStore::new());
        let sources = vec![
            source(
                SourceKind::Bing,
                vec!["https://a.com/1", "https://a.com/2", "https://a.com/3"],
            ),
            Arc::new(StaticSource {
                kind: SourceKind::Yahoo,
                urls: vec!["https://b.com/1"],
                delay: Duration::from_secs(600),
            }) as Arc<dyn Source>,
            source(SourceKind::Huxiu, vec!["https://c.com/1", "https://a.com/2"]),
        ];
        let scoring = ScoringConfig {
            limit: 5,
            ..ScoringConfig::default()
        };

        let report = pipeline(store.clone())
            .run_with_sources(&keywords(&["AI"]), &sources, &scoring)
            .await
            .unwrap();

        let keyword = &report.keywords[0];
        assert_eq!(keyword.status, KeywordStatus::Completed);
        assert_eq!(keyword.fetched, 5);
        assert_eq!(keyword.new, 4);
        assert_eq!(keyword.duplicates, 1);
        assert_eq!(keyword.adapters[1].status, AdapterStatus::Timeout);
        assert_eq!(store.count().await.unwrap(), 4);

        let ranked = report.ranked("AI").unwrap();
        assert_eq!(ranked.len(), 4);
        assert!(ranked.windows(2).all(|w| w[0].final_score >= w[1].final_score));
    }

    #[tokio::test]
    async fn test_config_errors() {
        let store: Arc<dyn ArticleStore> = Arc::new(MemoryStore::new());
        let sources = vec![source(SourceKind::Bing, vec!["https://a.com/1"])];
        let scoring = ScoringConfig::default();

        let result = pipeline(store.clone())
            .run_with_sources(&keywords(&["  ", ""]), &sources, &scoring)
            .await;
        assert!(matches!(result, Err(Error::Config(_))));

        let result = pipeline(store.clone())
            .run_with_sources(&keywords(&["AI"]), &[], &scoring)
            .await;
        assert!(matches!(result, Err(Error::Config(_))));

        let mut disabled = SourcesConfig::default();
        disabled.insert(
            SourceKind::Bing,
            SourceConfig {
                enabled: false,
                ..SourceConfig::default()
            },
        );
        let result = pipeline(store).run(&keywords(&["AI"]), &disabled, &scoring).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_normalize_keywords() {
        assert_eq!(
            normalize_keywords(&keywords(&[" AI ", "Rust", "", "AI", "rust"])),
            keywords(&["AI", "Rust", "rust"])
        );
    }

    #[tokio::test]
    async fn test_rediscovery_under_second_keyword_is_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let sources = vec![source(SourceKind::Bing, vec!["https://shared.com/x"])];

        let report = pipeline(store)
            .run_with_sources(&keywords(&["AI", "Rust"]), &sources, &ScoringConfig::default())
            .await
            .unwrap();

        assert_eq!(report.keywords[0].new, 1);
        assert_eq!(report.keywords[1].new, 0);
        assert_eq!(report.keywords[1].duplicates, 1);
        assert_eq!(report.ranked("AI").unwrap().len(), 1);
        assert!(report.ranked("Rust").unwrap().is_empty());
    }

    /// Rejects writes for the `broken` keyword, and every write once `broken` is set.
    struct FlakyStore {
        inner: MemoryStore,
        broken: AtomicBool,
    }

    #[async_trait]
    impl ArticleStore for FlakyStore {
        async fn insert_if_new(&self, article: &Article) -> Result<bool> {
            if article.keyword == "broken" || self.broken.load(Ordering::SeqCst) {
                return Err(Error::Database("disk I/O error".to_string()));
            }
            self.inner.insert_if_new(article).await
        }

        async fn query_window(
            &self,
            keyword: &str,
            since: Option<DateTime<Utc>>,
            limit: Option<usize>,
        ) -> Result<Vec<Article>> {
            self.inner.query_window(keyword, since, limit).await
        }

        async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
            self.inner.prune_older_than(cutoff).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn test_store_failure_only_fails_that_keyword() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            broken: AtomicBool::new(false),
        });
        let sources = vec![source(SourceKind::Bing, vec!["https://a.com/1", "https://a.com/2"])];

        let report = pipeline(store.clone())
            .run_with_sources(&keywords(&["broken", "AI"]), &sources, &ScoringConfig::default())
            .await
            .unwrap();

        assert!(matches!(report.keywords[0].status, KeywordStatus::Failed(_)));
        assert!(report.keywords[0].ranked.is_empty());
        assert_eq!(report.keywords[1].status, KeywordStatus::Completed);
        assert_eq!(report.keywords[1].new, 2);
        assert_eq!(report.failed().count(), 1);

    }

    #[tokio::test]
    async fn test_run_fails_when_every_keyword_fails() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            broken: AtomicBool::new(true),
        });
        let sources = vec![source(SourceKind::Bing, vec!["https://a.com/1"])];

        let result = pipeline(store)
            .run_with_sources(&keywords(&["AI", "Rust"]), &sources, &ScoringConfig::default())
            .await;
        match result {
            Err(Error::Storage(message)) => {
                assert!(message.contains("AI"), "{}", message);
                assert!(message.contains("disk I/O error"), "{}", message);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_keywords_keep_input_order() {
        let store = Arc::new(MemoryStore::new());
        let sources = vec![Arc::new(StaticSource {
            kind: SourceKind::Bing,
            urls: vec![],
            delay: Duration::from_millis(50),
        }) as Arc<dyn Source>];
        let list = keywords(&["k1", "k2", "k3", "k4", "k5"]);

        let report = pipeline(store)
            .with_keyword_concurrency(3)
            .run_with_sources(&list, &sources, &ScoringConfig::default())
            .await
            .unwrap();

        let order: Vec<_> = report.keywords.iter().map(|k| k.keyword.clone()).collect();
        assert_eq!(order, list);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            keywords: vec![KeywordReport::new("AI").fail(&Error::Storage("down".to_string()))],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["keywords"][0]["status"]["state"], "failed");
        assert_eq!(json["keywords"][0]["status"]["reason"], "Storage error: down");
    }
}
