use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::SourceKind;
use crate::{Error, Result};

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:138.0) Gecko/20100101 Firefox/138.0",
];

/// Bounds, in seconds, of the random pause taken before every request.
/// Written as `[min, max]` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct RequestInterval {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl From<(f64, f64)> for RequestInterval {
    fn from((min_secs, max_secs): (f64, f64)) -> Self {
        Self { min_secs, max_secs }
    }
}

impl From<RequestInterval> for (f64, f64) {
    fn from(interval: RequestInterval) -> Self {
        (interval.min_secs, interval.max_secs)
    }
}

impl Default for RequestInterval {
    fn default() -> Self {
        Self {
            min_secs: 1.0,
            max_secs: 3.0,
        }
    }
}

impl RequestInterval {
    pub const NONE: RequestInterval = RequestInterval {
        min_secs: 0.0,
        max_secs: 0.0,
    };

    pub fn validate(&self) -> Result<()> {
        if !self.min_secs.is_finite()
            || !self.max_secs.is_finite()
            || self.min_secs < 0.0
            || self.max_secs < self.min_secs
        {
            return Err(Error::Config(format!(
                "request interval must satisfy 0 <= min <= max, got [{}, {}]",
                self.min_secs, self.max_secs
            )));
        }
        Ok(())
    }
}

/// Per-adapter settings. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub request_interval: RequestInterval,
    pub max_results: usize,
    /// Budget for one whole `fetch` call, enforced by the collector.
    pub timeout_secs: u64,
    /// Budget for a single HTTP request.
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub user_agents: Vec<String>,
    pub api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub search_depth: Option<String>,
    pub feed_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_interval: RequestInterval::default(),
            max_results: 20,
            timeout_secs: 60,
            request_timeout_secs: 10,
            max_attempts: 3,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            api_key: None,
            search_engine_id: None,
            search_depth: None,
            feed_url: None,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self, kind: SourceKind) -> Result<()> {
        self.request_interval.validate()?;
        if self.max_attempts == 0 {
            return Err(Error::Config(format!("{}: max_attempts must be at least 1", kind)));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(format!("{}: timeout_secs must be positive", kind)));
        }
        Ok(())
    }
}

/// Settings for every adapter, keyed by source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcesConfig(pub BTreeMap<SourceKind, SourceConfig>);

impl SourcesConfig {
    pub fn get(&self, kind: SourceKind) -> Option<&SourceConfig> {
        self.0.get(&kind)
    }

    pub fn insert(&mut self, kind: SourceKind, config: SourceConfig) {
        self.0.insert(kind, config);
    }

    pub fn enabled(&self) -> impl Iterator<Item = (SourceKind, &SourceConfig)> {
        self.0
            .iter()
            .filter(|(_, config)| config.enabled)
            .map(|(kind, config)| (*kind, config))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub quality_weight: f64,
    pub freshness_weight: f64,
    pub time_decay_lambda: f64,
    /// Window over `crawled_at`. Zero means the whole history.
    pub time_range_hours: u32,
    pub limit: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            quality_weight: 0.7,
            freshness_weight: 0.3,
            time_decay_lambda: 0.1,
            time_range_hours: 24,
            limit: 20,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("quality_weight", self.quality_weight),
            ("freshness_weight", self.freshness_weight),
            ("time_decay_lambda", self.time_decay_lambda),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.limit == 0 {
            return Err(Error::Config("limit must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Upper bound of `final_score` under these weights.
    pub fn max_final_score(&self) -> f64 {
        self.quality_weight + self.freshness_weight
    }
}
