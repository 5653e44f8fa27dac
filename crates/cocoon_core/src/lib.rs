pub mod canonical;
pub mod config;
pub mod error;
pub mod storage;
pub mod types;

pub use canonical::canonicalize_url;
pub use config::{RequestInterval, ScoringConfig, SourceConfig, SourcesConfig};
pub use error::{Error, Result};
pub use storage::{ArticleStore, SubscriptionStore};
pub use types::{Article, ScoredArticle, SourceKind, Subscription, CONTENT_MAX_CHARS};
