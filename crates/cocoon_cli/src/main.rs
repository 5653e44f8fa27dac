use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use cocoon_core::{ArticleStore, Error, Result, SourceKind, SubscriptionStore};
use cocoon_pipeline::{AppConfig, KeywordStatus, Pipeline, RunReport};
use cocoon_sources::{build_http_client, init_logging, AdapterStatus};
use cocoon_storage::{BackendConfig, MemoryStore, SqliteStore, StorageBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const STORE_OPEN_ATTEMPTS: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "cocoon", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config.yaml. Defaults to ./config.yaml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite database file. Overrides `database.path`.
    #[arg(long)]
    database: Option<PathBuf>,
    #[arg(long, default_value = "sqlite", help = "Storage backend: sqlite (default) or memory")]
    storage: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Collect, store and rank articles once
    Run {
        /// Keyword to process; repeatable. Defaults to the enabled subscriptions.
        #[arg(long = "keyword", short = 'k')]
        keywords: Vec<String>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List sources with their state
    Sources,
    Subscriptions {
        #[command(subcommand)]
        command: SubscriptionCommands,
    },
    /// Delete articles crawled more than N days ago
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum SubscriptionCommands {
    List,
    Add { keyword: String },
    Remove { keyword: String },
    Enable { keyword: String },
    Disable { keyword: String },
}

async fn open_store<S: StorageBackend + 'static>(config: &BackendConfig) -> Result<Arc<S>> {
    let mut last_error = None;

    for attempt in 1..=STORE_OPEN_ATTEMPTS {
        let opened = match S::open(config).await {
            Ok(store) => {
                // A store that cannot answer a count is not usable for dedup.
                let checked = tokio::time::timeout(Duration::from_secs(10), store.count()).await;
                match checked {
                    Ok(Ok(count)) => Ok((store, count)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(Error::Timeout(Duration::from_secs(10))),
                }
            }
            Err(e) => Err(e),
        };

        match opened {
            Ok((store, count)) => {
                info!(
                    "💾 Storage ready (using {}, {} articles)",
                    S::backend_name(),
                    count
                );
                return Ok(Arc::new(store));
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < STORE_OPEN_ATTEMPTS {
                    info!(
                        "Storage initialization failed, retrying {}/{}...",
                        attempt, STORE_OPEN_ATTEMPTS
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::Storage("Storage initialization failed".to_string())))
}

/// Explicit keywords win, then enabled subscriptions, then the configured defaults.
async fn resolve_keywords<S: SubscriptionStore + ?Sized>(
    explicit: Vec<String>,
    store: &S,
    config: &AppConfig,
) -> Result<Vec<String>> {
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    let subscribed = store.enabled_keywords().await?;
    if !subscribed.is_empty() {
        return Ok(subscribed);
    }
    Ok(config.subscriptions.default_keywords.clone())
}

async fn add_subscription<S: SubscriptionStore + ?Sized>(
    store: &S,
    keyword: &str,
    max_keywords: usize,
) -> Result<bool> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(Error::Config("keyword must not be empty".to_string()));
    }
    let existing = store.subscriptions().await?;
    if existing.iter().any(|s| s.keyword == keyword) {
        return Ok(false);
    }
    if existing.len() >= max_keywords {
        return Err(Error::Config(format!(
            "subscription limit reached ({} keywords)",
            max_keywords
        )));
    }
    store.add_subscription(keyword).await
}

fn print_report(report: &RunReport) {
    for keyword in &report.keywords {
        let state = match &keyword.status {
            KeywordStatus::Completed => "completed".to_string(),
            KeywordStatus::Failed(reason) => format!("failed: {}", reason),
        };
        println!(
            "== {} ({}) fetched {}, new {}, duplicates {}",
            keyword.keyword, state, keyword.fetched, keyword.new, keyword.duplicates
        );
        for adapter in &keyword.adapters {
            let status = match &adapter.status {
                AdapterStatus::Success { fetched } => format!("✅ {} results", fetched),
                AdapterStatus::Timeout => "⏱️ timeout".to_string(),
                AdapterStatus::Error(reason) => format!("❌ {}", reason),
            };
            println!("   {:<7} {} ({}ms)", adapter.source, status, adapter.elapsed_ms);
        }
        for (rank, scored) in keyword.ranked.iter().enumerate() {
            println!(
                "{:>3}. [{:.3}] {} ({})\n       {}",
                rank + 1,
                scored.final_score,
                scored.article.title,
                scored.article.source,
                scored.article.url
            );
        }
    }
}

async fn execute<S: StorageBackend + 'static>(store: Arc<S>, cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Commands::Run { keywords, json } => {
            let keywords = resolve_keywords(keywords, store.as_ref(), &config).await?;
            info!("🦗 Running for: {}", keywords.join(", "));

            let articles: Arc<dyn ArticleStore> = store.clone();
            let pipeline = Pipeline::new(articles, build_http_client()?)
                .with_keyword_concurrency(config.pipeline.keyword_concurrency);
            let report = pipeline
                .run(&keywords, &config.sources, &config.scoring)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Sources => {
            for kind in SourceKind::ALL {
                let source = config.source(kind);
                println!(
                    "{:<7} {:<9} {}",
                    kind,
                    if source.enabled { "enabled" } else { "disabled" },
                    if kind.is_high_trust() { "high-trust" } else { "standard" }
                );
            }
        }
        Commands::Subscriptions { command } => match command {
            SubscriptionCommands::List => {
                for subscription in store.subscriptions().await? {
                    println!(
                        "{} {} (since {})",
                        if subscription.enabled { "✅" } else { "⏸️" },
                        subscription.keyword,
                        subscription.created_at.format("%Y-%m-%d")
                    );
                }
            }
            SubscriptionCommands::Add { keyword } => {
                if add_subscription(store.as_ref(), &keyword, config.subscriptions.max_keywords).await? {
                    println!("Subscribed to {}", keyword.trim());
                } else {
                    println!("Already subscribed to {}", keyword.trim());
                }
            }
            SubscriptionCommands::Remove { keyword } => {
                let removed = store.remove_subscription(&keyword).await?;
                println!("{}", if removed { "Removed" } else { "No such subscription" });
            }
            SubscriptionCommands::Enable { keyword } => {
                let found = store.set_enabled(&keyword, true).await?;
                println!("{}", if found { "Enabled" } else { "No such subscription" });
            }
            SubscriptionCommands::Disable { keyword } => {
                let found = store.set_enabled(&keyword, false).await?;
                println!("{}", if found { "Disabled" } else { "No such subscription" });
            }
        },
        Commands::Prune { days } => {
            let days = days.unwrap_or(config.pipeline.retention_days);
            let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
            let removed = store.prune_older_than(cutoff).await?;
            info!("🧹 Removed {} articles older than {} days", removed, days);
            println!("Removed {} articles", removed);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    init_logging(&config.logging.level);

    let backend = BackendConfig {
        database_path: config.database.path.clone(),
    };
    match cli.storage.as_str() {
        "sqlite" => {
            let store = open_store::<SqliteStore>(&backend).await?;
            execute(store, cli, config).await
        }
        "memory" => {
            let store = open_store::<MemoryStore>(&backend).await?;
            execute(store, cli, config).await
        }
        other => Err(Error::Config(format!("unknown storage backend: {}", other))),
    }
}
