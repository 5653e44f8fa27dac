pub mod config;
pub mod orchestrator;
pub mod scoring;

pub use config::AppConfig;
pub use orchestrator::{normalize_keywords, KeywordReport, KeywordStatus, Pipeline, RunReport};
pub use scoring::{rank_candidates, score_article, ScoringEngine};

pub mod prelude {
    pub use super::config::AppConfig;
    pub use super::orchestrator::{Pipeline, RunReport};
    pub use super::scoring::ScoringEngine;
    pub use cocoon_core::{Error, Result, ScoringConfig, SourcesConfig};
}
