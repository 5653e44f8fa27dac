use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cocoon_core::{Article, ArticleStore, Error, Result, Subscription, SubscriptionStore};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::{BackendConfig, StorageBackend};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        source TEXT NOT NULL,
        keyword TEXT NOT NULL,
        crawled_at INTEGER NOT NULL,
        published_at INTEGER
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_articles_keyword_crawled
    ON articles (keyword, crawled_at)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_articles_crawled ON articles (crawled_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        keyword TEXT NOT NULL UNIQUE,
        enabled INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL
    )
    "#,
];

/// SQLite-backed store. Timestamps are stored as Unix milliseconds so that
/// window queries and the monotonic `crawled_at` clamp compare numerically.
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SqliteStore {
    fn backend_name() -> &'static str {
        "sqlite"
    }

    async fn open(config: &BackendConfig) -> Result<Self> {
        Self::new_with_path(&config.database_path).await
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Database(format!("Invalid timestamp in database: {}", ms)))
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    let get_err = |e: sqlx::Error| Error::Database(format!("Failed to read article row: {}", e));
    let source: String = row.try_get("source").map_err(get_err)?;
    let crawled_at: i64 = row.try_get("crawled_at").map_err(get_err)?;
    let published_at: Option<i64> = row.try_get("published_at").map_err(get_err)?;

    Ok(Article {
        id: Some(row.try_get("id").map_err(get_err)?),
        url: row.try_get("url").map_err(get_err)?,
        title: row.try_get("title").map_err(get_err)?,
        content: row.try_get("content").map_err(get_err)?,
        source: source.parse()?,
        keyword: row.try_get("keyword").map_err(get_err)?,
        crawled_at: from_millis(crawled_at)?,
        published_at: published_at.map(from_millis).transpose()?,
    })
}

impl SqliteStore {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }
        info!("💾 SQLite store ready at {}", db_path.display());

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn insert_if_new(&self, article: &Article) -> Result<bool> {
        // One statement: the unique constraint makes check-and-write atomic and
        // the MAX() keeps crawled_at non-decreasing in insertion order.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
            (url, title, content, source, keyword, crawled_at, published_at)
            VALUES (?, ?, ?, ?, ?, MAX(?, COALESCE((SELECT MAX(crawled_at) FROM articles), 0)), ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.source.as_str())
        .bind(&article.keyword)
        .bind(to_millis(Utc::now()))
        .bind(article.published_at.map(to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to store article {}: {}", article.url, e)))?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!("Duplicate article skipped: {}", article.url);
        }
        Ok(inserted)
    }

    async fn query_window(
        &self,
        keyword: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Article>> {
        let since = since.map(to_millis);
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT id, url, title, content, source, keyword, crawled_at, published_at
            FROM articles
            WHERE keyword = ? AND (? IS NULL OR crawled_at >= ?)
            ORDER BY crawled_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(keyword)
        .bind(since)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to query articles for {}: {}", keyword, e)))?;

        rows.iter().map(row_to_article).collect()
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE crawled_at < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to prune articles: {}", e)))?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count articles: {}", e)))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn add_subscription(&self, keyword: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscriptions (keyword, enabled, created_at) VALUES (?, 1, ?)",
        )
        .bind(keyword)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to add subscription: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_subscription(&self, keyword: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE keyword = ?")
            .bind(keyword)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to remove subscription: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_enabled(&self, keyword: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE subscriptions SET enabled = ? WHERE keyword = ?")
            .bind(enabled)
            .bind(keyword)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update subscription: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query("SELECT keyword, enabled, created_at FROM subscriptions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list subscriptions: {}", e)))?;

        rows.iter()
            .map(|row| {
                let get_err =
                    |e: sqlx::Error| Error::Database(format!("Failed to read subscription: {}", e));
                Ok(Subscription {
                    keyword: row.try_get("keyword").map_err(get_err)?,
                    enabled: row.try_get("enabled").map_err(get_err)?,
                    created_at: from_millis(row.try_get("created_at").map_err(get_err)?)?,
                })
            })
            .collect()
    }
}
