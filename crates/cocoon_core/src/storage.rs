use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Article, Subscription};
use crate::Result;

/// Keyed article store with an add-if-absent guarantee on the URL.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Stores the article unless its URL is already known. Returns `true` when
    /// the article was stored. The check and the write are atomic with respect
    /// to concurrent callers.
    async fn insert_if_new(&self, article: &Article) -> Result<bool>;

    /// Articles for `keyword` crawled at or after `since` (all history when
    /// `None`), newest first, at most `limit` of them.
    async fn query_window(
        &self,
        keyword: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Article>>;

    /// Deletes articles crawled before `cutoff`, returning how many were removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn count(&self) -> Result<usize>;
}

/// Provider of the subscribed keywords.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Adds an enabled subscription. Returns `false` when the keyword exists.
    async fn add_subscription(&self, keyword: &str) -> Result<bool>;

    async fn remove_subscription(&self, keyword: &str) -> Result<bool>;

    async fn set_enabled(&self, keyword: &str, enabled: bool) -> Result<bool>;

    async fn subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Snapshot of the enabled keywords, oldest subscription first.
    async fn enabled_keywords(&self) -> Result<Vec<String>> {
        Ok(self
            .subscriptions()
            .await?
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| s.keyword)
            .collect())
    }
}
