use cocoon_core::{Error, Result, ScoringConfig, SourceConfig, SourceKind, SourcesConfig};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/cocoon.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Keywords processed at the same time. Results keep keyword order.
    pub keyword_concurrency: usize,
    pub retention_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyword_concurrency: 1,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionsConfig {
    /// Used when the store holds no enabled subscription.
    pub default_keywords: Vec<String>,
    pub max_keywords: usize,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            default_keywords: Vec::new(),
            max_keywords: 5,
        }
    }
}

/// Contents of `config.yaml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
    pub subscriptions: SubscriptionsConfig,
    pub scoring: ScoringConfig,
    pub sources: SourcesConfig,
}

/// Replaces `${VAR}` with `lookup(VAR)`, or with nothing when it is unset.
pub fn substitute_env_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_VAR
        .replace_all(input, |caps: &Captures| lookup(&caps[1]).unwrap_or_default())
        .into_owned()
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str_with(&raw, env_lookup)
    }

    /// Loads `path`, or `config.yaml` when present, or the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_PATH))
            }
            None => Self::from_yaml_str_with("{}", env_lookup),
        }
    }

    pub fn from_yaml_str_with<F>(raw: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = substitute_env_with(raw, &lookup);
        let mut config: AppConfig = if expanded.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.fill_sources(&lookup);
        config.validate()?;
        Ok(config)
    }

    /// Adds every source missing from the file and fills API credentials from
    /// the environment. API sources that were not configured and have no
    /// credentials stay disabled.
    fn fill_sources<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for kind in SourceKind::ALL {
            let configured = self.sources.get(kind).is_some();
            let mut source = self.sources.get(kind).cloned().unwrap_or_default();
            source.api_key = source.api_key.filter(|k| !k.is_empty());
            source.search_engine_id = source.search_engine_id.filter(|k| !k.is_empty());

            match kind {
                SourceKind::Tavily => {
                    source.api_key = source.api_key.or_else(|| lookup("TAVILY_API_KEY"));
                    if !configured && source.api_key.is_none() {
                        source.enabled = false;
                    }
                }
                SourceKind::Google => {
                    source.api_key = source.api_key.or_else(|| lookup("GOOGLE_API_KEY"));
                    source.search_engine_id = source
                        .search_engine_id
                        .or_else(|| lookup("GOOGLE_SEARCH_ENGINE_ID"));
                    if !configured && (source.api_key.is_none() || source.search_engine_id.is_none())
                    {
                        source.enabled = false;
                    }
                }
                _ => {}
            }
            self.sources.insert(kind, source);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        for (kind, source) in &self.sources.0 {
            source.validate(*kind)?;
        }
        if self.pipeline.keyword_concurrency == 0 {
            return Err(Error::Config(
                "pipeline.keyword_concurrency must be at least 1".to_string(),
            ));
        }
        if self.subscriptions.max_keywords == 0 {
            return Err(Error::Config(
                "subscriptions.max_keywords must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn source(&self, kind: SourceKind) -> SourceConfig {
        self.sources.get(kind).cloned().unwrap_or_default()
    }
}
