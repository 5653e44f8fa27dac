use chrono::{DateTime, Duration, Utc};
use cocoon_core::{Article, ArticleStore, Result, ScoredArticle, ScoringConfig, CONTENT_MAX_CHARS};
use std::cmp::Ordering;
use std::sync::Arc;

/// Multiplier applied to the quality of results from search APIs.
pub const HIGH_TRUST_BOOST: f64 = 1.2;

/// Scores closer than this are treated as equal when ranking.
const SCORE_RESOLUTION: f64 = 1e-9;

pub fn quality_score(article: &Article) -> f64 {
    let mut quality = (article.content_chars() as f64 / CONTENT_MAX_CHARS as f64).min(1.0);
    if article.source.is_high_trust() {
        quality = (quality * HIGH_TRUST_BOOST).min(1.0);
    }
    quality
}

/// `exp(-lambda * hours)` since the crawl. Crawl times in the future count as
/// age zero.
pub fn freshness_score(article: &Article, lambda: f64, now: DateTime<Utc>) -> f64 {
    let hours = (now - article.crawled_at).num_milliseconds() as f64 / 3_600_000.0;
    (-lambda * hours.max(0.0)).exp()
}

pub fn score_article(article: Article, config: &ScoringConfig, now: DateTime<Utc>) -> ScoredArticle {
    let quality_score = quality_score(&article);
    let freshness_score = freshness_score(&article, config.time_decay_lambda, now);
    let final_score =
        config.quality_weight * quality_score + config.freshness_weight * freshness_score;
    ScoredArticle {
        article,
        quality_score,
        freshness_score,
        final_score,
    }
}

fn quantized(score: f64) -> i64 {
    (score / SCORE_RESOLUTION).round() as i64
}

/// Highest score first; near-equal scores fall back to the newer crawl, then
/// to the earlier insertion.
fn rank_order(a: &ScoredArticle, b: &ScoredArticle) -> Ordering {
    quantized(b.final_score)
        .cmp(&quantized(a.final_score))
        .then_with(|| b.article.crawled_at.cmp(&a.article.crawled_at))
        .then_with(|| a.article.id.cmp(&b.article.id))
}

/// Scores `candidates` as of `now` and returns the best `config.limit`.
pub fn rank_candidates(
    candidates: Vec<Article>,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Vec<ScoredArticle> {
    let mut scored: Vec<ScoredArticle> = candidates
        .into_iter()
        .map(|article| score_article(article, config, now))
        .collect();
    scored.sort_by(rank_order);
    scored.truncate(config.limit);
    scored
}

/// Ranks stored articles for a keyword.
pub struct ScoringEngine {
    store: Arc<dyn ArticleStore>,
}

impl ScoringEngine {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    pub async fn rank(&self, keyword: &str, config: &ScoringConfig) -> Result<Vec<ScoredArticle>> {
        self.rank_at(keyword, config, Utc::now()).await
    }

    pub async fn rank_at(
        &self,
        keyword: &str,
        config: &ScoringConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredArticle>> {
        config.validate()?;
        let since = match config.time_range_hours {
            0 => None,
            hours => Some(now - Duration::hours(i64::from(hours))),
        };
        let candidates = self
            .store
            .query_window(keyword, since, Some(config.limit.saturating_mul(2)))
            .await?;
        Ok(rank_candidates(candidates, config, now))
    }
}
