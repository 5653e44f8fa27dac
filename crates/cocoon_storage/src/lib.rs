use async_trait::async_trait;
use cocoon_core::{ArticleStore, Result, SubscriptionStore};
use std::path::PathBuf;

pub mod backends;

pub use backends::*;

/// A store that can be opened from configuration.
#[async_trait]
pub trait StorageBackend: ArticleStore + SubscriptionStore {
    fn backend_name() -> &'static str
    where
        Self: Sized;

    async fn open(config: &BackendConfig) -> Result<Self>
    where
        Self: Sized;
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub database_path: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/cocoon.db"),
        }
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{BackendConfig, StorageBackend};
}
