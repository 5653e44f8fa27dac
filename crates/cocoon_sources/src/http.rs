use cocoon_core::{Error, RequestInterval, Result, SourceConfig, SourceKind};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use reqwest::header::USER_AGENT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::logging::Logger;

const MAX_JITTER_MS: u64 = 250;

/// The HTTP client shared by every adapter of a run. Cookies persist across
/// requests so homepage visits can seed search sessions.
pub fn build_http_client() -> Result<Client> {
    let client = Client::builder()
        .cookie_store(true)
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}

/// Result of a bounded retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success(T),
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last_error: Error },
    /// A non-transient error stopped the loop early.
    Aborted(Error),
}

impl<T> RetryOutcome<T> {
    pub fn into_result(self) -> Result<T> {
        match self {
            RetryOutcome::Success(value) => Ok(value),
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => Err(Error::RetriesExhausted {
                attempts,
                last_error: last_error.to_string(),
            }),
            RetryOutcome::Aborted(e) => Err(e),
        }
    }
}

/// Exponential backoff: `base`, doubling per failed attempt, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next attempt, `failed` being the number of attempts
    /// that already failed (1-based). Jitter is added by the caller.
    pub fn delay_for(&self, failed: u32) -> Duration {
        let factor = 1u32.checked_shl(failed.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, logger: &Logger, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(e) => e,
            };

            if !error.is_transient() {
                return RetryOutcome::Aborted(error);
            }
            if attempt >= max_attempts {
                logger.warn(&format!(
                    "Giving up after {} attempts ({}ms): {}",
                    attempt,
                    started.elapsed().as_millis(),
                    error
                ));
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error,
                };
            }

            let jitter = Duration::from_millis(thread_rng().gen_range(0..=MAX_JITTER_MS));
            let delay = self.delay_for(attempt) + jitter;
            logger.debug(&format!(
                "Attempt {}/{} failed, retrying in {:?}: {}",
                attempt, max_attempts, delay, error
            ));
            sleep(delay).await;
        }
    }
}

/// Per-adapter view over the shared client: random pause before each request,
/// rotating `User-Agent`, per-request timeout and bounded retries.
#[derive(Debug, Clone)]
pub struct PoliteClient {
    client: Client,
    interval: RequestInterval,
    user_agents: Vec<String>,
    request_timeout: Duration,
    retry: RetryPolicy,
    logger: Logger,
}

impl PoliteClient {
    pub fn new(client: Client, kind: SourceKind, config: &SourceConfig) -> Self {
        Self {
            client,
            interval: config.request_interval,
            user_agents: config.user_agents.clone(),
            request_timeout: config.request_timeout(),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                ..RetryPolicy::default()
            },
            logger: Logger::new().with_prefix(kind.as_str()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn pause_duration(&self) -> Duration {
        let RequestInterval { min_secs, max_secs } = self.interval;
        if max_secs <= min_secs {
            return Duration::from_secs_f64(min_secs.max(0.0));
        }
        Duration::from_secs_f64(thread_rng().gen_range(min_secs..=max_secs))
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents.choose(&mut thread_rng()).map(String::as_str)
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String)> {
        let pause = self.pause_duration();
        if !pause.is_zero() {
            sleep(pause).await;
        }

        let mut request = request;
        if let Some(agent) = self.pick_user_agent() {
            request = request.header(USER_AGENT, agent);
        }
        if !self.request_timeout.is_zero() {
            request = request.timeout(self.request_timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// One GET, any status.
    pub async fn get_once(&self, url: &str, query: &[(&str, String)]) -> Result<(StatusCode, String)> {
        self.send(self.client.get(url).query(query)).await
    }

    /// One JSON POST, any status.
    pub async fn post_json_once<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(StatusCode, String)> {
        self.send(self.client.post(url).json(body)).await
    }

    /// GET with retries; non-2xx answers count as failed attempts.
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        self.with_retry(|| async move {
            let (status, body) = self.get_once(url, query).await?;
            if !status.is_success() {
                return Err(Error::Source(format!("HTTP {} from {}", status, url)));
            }
            Ok(body)
        })
        .await
    }

    pub async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry.run(&self.logger, op).await.into_result()
    }

    /// Homepage visit to pick up session cookies. Failures are only logged.
    pub async fn visit(&self, url: &str) {
        match self.get_once(url, &[]).await {
            Ok((status, _)) if status.is_success() => {
                self.logger.debug(&format!("Visited {}", url));
            }
            Ok((status, _)) => {
                self.logger.debug(&format!("Homepage {} answered {}", url, status));
            }
            Err(e) => self.logger.debug(&format!("Homepage {} unreachable: {}", url, e)),
        }
    }
}
