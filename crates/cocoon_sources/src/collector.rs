use cocoon_core::{Article, Result, SourceKind};
use futures::future::join_all;
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::logging::Logger;
use crate::sources::Source;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AdapterStatus {
    Success { fetched: usize },
    Timeout,
    Error(String),
}

impl AdapterStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AdapterStatus::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterReport {
    pub source: SourceKind,
    pub status: AdapterStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
pub struct CollectionResult {
    /// Union of every successful adapter's output. Order is unspecified and
    /// the same URL may appear more than once.
    pub articles: Vec<Article>,
    /// One entry per adapter, in the order the adapters were given.
    pub reports: Vec<AdapterReport>,
}

impl CollectionResult {
    pub fn fetched(&self) -> usize {
        self.articles.len()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aborts the adapter task when the collector stops waiting for it.
struct AbortOnDrop(JoinHandle<Result<Vec<Article>>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_one(source: Arc<dyn Source>, keyword: String) -> (Vec<Article>, AdapterReport) {
    let kind = source.kind();
    let budget = source.timeout();
    let max_results = source.max_results();
    let logger = Logger::new().with_prefix(kind.as_str()).with_prefix(&keyword);
    let started = Instant::now();

    // Each adapter gets its own task, so one that blocks its thread cannot
    // hold back the deadline of the others.
    let mut task = AbortOnDrop(tokio::spawn(async move {
        source.fetch(&keyword, max_results).await
    }));

    let (articles, status) = match timeout(budget, &mut task.0).await {
        Ok(Ok(Ok(mut articles))) => {
            articles.truncate(max_results);
            let fetched = articles.len();
            (articles, AdapterStatus::Success { fetched })
        }
        Ok(Ok(Err(e))) => {
            logger.warn(&format!("❌ Fetch failed: {}", e));
            (Vec::new(), AdapterStatus::Error(e.to_string()))
        }
        Ok(Err(join_error)) if join_error.is_panic() => {
            let message = panic_message(join_error.into_panic());
            logger.error(&format!("💥 Adapter panicked: {}", message));
            (Vec::new(), AdapterStatus::Error(format!("panic: {}", message)))
        }
        Ok(Err(join_error)) => {
            logger.warn(&format!("Adapter task cancelled: {}", join_error));
            (Vec::new(), AdapterStatus::Error(join_error.to_string()))
        }
        Err(_) => {
            logger.warn(&format!("⏱️ Timed out after {:?}", budget));
            (Vec::new(), AdapterStatus::Timeout)
        }
    };
    drop(task);

    let report = AdapterReport {
        source: kind,
        status,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    (articles, report)
}

/// Queries every source for `keyword` concurrently, each in its own task under
/// its own timeout. A failing, panicking or slow source only loses its own
/// results. Dropping the returned future aborts all outstanding fetches.
pub async fn collect(sources: &[Arc<dyn Source>], keyword: &str) -> CollectionResult {
    let outcomes = join_all(
        sources
            .iter()
            .map(|source| run_one(Arc::clone(source), keyword.to_string())),
    )
    .await;

    let mut result = CollectionResult::default();
    for (articles, report) in outcomes {
        result.articles.extend(articles);
        result.reports.push(report);
    }
    result
}
