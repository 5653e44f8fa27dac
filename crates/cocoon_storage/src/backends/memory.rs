use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cocoon_core::{Article, ArticleStore, Result, Subscription, SubscriptionStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{BackendConfig, StorageBackend};

#[derive(Default)]
struct Inner {
    articles: Vec<Article>,
    by_url: HashMap<String, usize>,
    next_id: i64,
    last_crawled_at: Option<DateTime<Utc>>,
    subscriptions: Vec<Subscription>,
}

/// Process-local store. Everything lives behind one lock, so insert-if-new is
/// a single critical section.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn backend_name() -> &'static str {
        "memory"
    }

    async fn open(_config: &BackendConfig) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert_if_new(&self, article: &Article) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.by_url.contains_key(&article.url) {
            return Ok(false);
        }

        let now = Utc::now();
        let crawled_at = match inner.last_crawled_at {
            Some(last) if last > now => last,
            _ => now,
        };
        inner.next_id += 1;

        let mut stored = article.clone();
        stored.id = Some(inner.next_id);
        stored.crawled_at = crawled_at;

        let index = inner.articles.len();
        inner.by_url.insert(stored.url.clone(), index);
        inner.articles.push(stored);
        inner.last_crawled_at = Some(crawled_at);
        Ok(true)
    }

    async fn query_window(
        &self,
        keyword: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Article>> {
        let inner = self.inner.read().await;
        let mut articles: Vec<Article> = inner
            .articles
            .iter()
            .filter(|a| a.keyword == keyword)
            .filter(|a| since.map_or(true, |since| a.crawled_at >= since))
            .cloned()
            .collect();
        articles.sort_by(|a, b| {
            b.crawled_at
                .cmp(&a.crawled_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = limit {
            articles.truncate(limit);
        }
        Ok(articles)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.articles.len();
        inner.articles.retain(|a| a.crawled_at >= cutoff);
        let removed = before - inner.articles.len();

        let by_url = inner
            .articles
            .iter()
            .enumerate()
            .map(|(i, a)| (a.url.clone(), i))
            .collect();
        inner.by_url = by_url;
        Ok(removed as u64)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().await.articles.len())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn add_subscription(&self, keyword: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.subscriptions.iter().any(|s| s.keyword == keyword) {
            return Ok(false);
        }
        inner.subscriptions.push(Subscription {
            keyword: keyword.to_string(),
            enabled: true,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn remove_subscription(&self, keyword: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.keyword != keyword);
        Ok(inner.subscriptions.len() != before)
    }

    async fn set_enabled(&self, keyword: &str, enabled: bool) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.subscriptions.iter_mut().find(|s| s.keyword == keyword) {
            Some(subscription) => {
                subscription.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.inner.read().await.subscriptions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cocoon_core::SourceKind;
    use std::sync::Arc;

    fn article(url: &str, keyword: &str) -> Article {
        Article::new(url, "Test Article", "Test content", SourceKind::Bing, keyword).unwrap()
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = MemoryStore::new();
        let a = article("https://example.com/1", "AI");
        assert!(store.insert_if_new(&a).await.unwrap());
        assert!(!store.insert_if_new(&a).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rediscovery_under_other_keyword_keeps_first_owner() {
        let store = MemoryStore::new();
        assert!(store.insert_if_new(&article("https://example.com/1", "AI")).await.unwrap());
        assert!(!store.insert_if_new(&article("https://example.com/1", "Rust")).await.unwrap());

        assert_eq!(store.query_window("AI", None, None).await.unwrap().len(), 1);
        assert!(store.query_window("Rust", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_store_one_row() {
        let store = Arc::new(MemoryStore::new());
        let a = article("https://example.com/race", "AI");

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                let a = a.clone();
                tokio::spawn(async move { store.insert_if_new(&a).await.unwrap() })
            })
            .collect();

        let mut new_count = 0;
        for task in tasks {
            if task.await.unwrap() {
                new_count += 1;
            }
        }
        assert_eq!(new_count, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_assigns_ids_and_monotonic_crawl_times() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut a = article(&format!("https://example.com/{}", i), "AI");
            a.crawled_at = Utc::now() - Duration::days(3);
            store.insert_if_new(&a).await.unwrap();
        }
        let mut stored = store.query_window("AI", None, None).await.unwrap();
        stored.sort_by_key(|a| a.id);
        for pair in stored.windows(2) {
            assert!(pair[0].id < pair[1].id);
            assert!(pair[0].crawled_at <= pair[1].crawled_at);
        }
    }

    #[tokio::test]
    async fn test_query_window_filters_and_limits() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store
                .insert_if_new(&article(&format!("https://example.com/{}", i), "AI"))
                .await
                .unwrap();
        }
        store.insert_if_new(&article("https://example.com/other", "Rust")).await.unwrap();

        let window = store.query_window("AI", None, Some(3)).await.unwrap();
        assert_eq!(window.len(), 3);
        assert!(window.iter().all(|a| a.keyword == "AI"));
        assert!(window[0].id > window[1].id);

        let future = Utc::now() + Duration::hours(1);
        assert!(store.query_window("AI", Some(future), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_removes_old_and_frees_url() {
        let store = MemoryStore::new();
        let a = article("https://example.com/old", "AI");
        store.insert_if_new(&a).await.unwrap();

        let removed = store
            .prune_older_than(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.insert_if_new(&a).await.unwrap());
    }

    #[tokio::test]
    async fn test_subscriptions() {
        let store = MemoryStore::new();
        assert!(store.add_subscription("AI").await.unwrap());
        assert!(store.add_subscription("Rust").await.unwrap());
        assert!(!store.add_subscription("AI").await.unwrap());

        assert!(store.set_enabled("AI", false).await.unwrap());
        assert!(!store.set_enabled("missing", false).await.unwrap());
        assert_eq!(store.enabled_keywords().await.unwrap(), vec!["Rust".to_string()]);

        assert!(store.remove_subscription("Rust").await.unwrap());
        assert!(!store.remove_subscription("Rust").await.unwrap());
        assert_eq!(store.subscriptions().await.unwrap().len(), 1);
    }
}
