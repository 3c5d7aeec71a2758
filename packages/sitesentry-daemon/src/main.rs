//! Monitor daemon.
//!
//! Wires the engine to its default ports and runs until SIGINT. Embedding
//! and LLM ports are deployment-specific; without them the daemon still
//! detects changes and classifies with rules alone (the other classifiers
//! abstain).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sitesentry::browser::{BrowserPool, HttpFetcher};
use sitesentry::config::MonitorConfig;
use sitesentry::error::{LlmResult, MonitorError};
use sitesentry::orchestrator::Orchestrator;
use sitesentry::scheduler::SystemClock;
use sitesentry::stores::MemoryStore;
use sitesentry::traits::{
    Embedder, LlmClassifier, LlmVerdict, NullNotifier, PageFetcher, PromptContext,
};
use sitesentry::types::{Schedule, Site, VectorKind};
use sitesentry::workflow::WorkflowEngine;

#[derive(Parser, Debug)]
#[command(name = "sitesentry-daemon", about = "Website defacement monitor")]
struct Args {
    /// JSON file with sites to monitor: [{"url", "name", "schedule"}]
    #[arg(long)]
    sites: Option<PathBuf>,

    /// Fetch over plain HTTP instead of launching headless chromium
    #[arg(long)]
    http_fetcher: bool,
}

#[derive(serde::Deserialize)]
struct SiteSpec {
    url: String,
    name: String,
    schedule: String,
}

/// Placeholder embedding port: always fails, so the semantic analyzer
/// abstains. Real deployments plug in a model-backed implementation.
struct UnconfiguredEmbedder;

#[async_trait::async_trait]
impl Embedder for UnconfiguredEmbedder {
    async fn embed(&self, _text: &str, _kind: VectorKind) -> sitesentry::Result<Vec<f32>> {
        Err(MonitorError::Embedding("no embedding port configured".to_string()))
    }

    fn dimension(&self) -> usize {
        0
    }
}

/// Placeholder LLM port: always abstains.
struct UnconfiguredLlm;

#[async_trait::async_trait]
impl LlmClassifier for UnconfiguredLlm {
    async fn classify(&self, _context: &PromptContext) -> LlmResult<LlmVerdict> {
        Err(sitesentry::LlmError::Upstream("no LLM port configured".into()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = MonitorConfig::from_env();

    let fetcher: Arc<dyn PageFetcher> = if args.http_fetcher {
        info!("using plain HTTP fetcher");
        Arc::new(HttpFetcher::new(&config.browser).context("building HTTP fetcher")?)
    } else {
        info!(pool_size = config.browser.pool_size, "launching browser pool");
        Arc::new(
            BrowserPool::launch(config.browser.clone())
                .await
                .context("launching browser pool (pass --http-fetcher to skip chromium)")?,
        )
    };

    warn!("embedding and LLM ports not configured; semantic and LLM classifiers will abstain");

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(WorkflowEngine::new(
        config.clone(),
        fetcher,
        Arc::new(UnconfiguredEmbedder),
        Arc::new(UnconfiguredLlm),
        store.clone(),
        Arc::new(NullNotifier),
        Arc::new(SystemClock),
    ));

    let orchestrator = Orchestrator::new(config, store, engine);

    if let Some(path) = &args.sites {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let specs: Vec<SiteSpec> = serde_json::from_str(&raw).context("parsing sites file")?;
        for spec in specs {
            let schedule = Schedule::parse(&spec.schedule)
                .with_context(|| format!("invalid schedule for {}", spec.url))?;
            orchestrator
                .register_site(Site::new(spec.url, spec.name, schedule))
                .await
                .context("registering site")?;
        }
    }

    orchestrator.start().await.context("starting monitor")?;
    info!("monitoring; press ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    orchestrator.stop().await.context("stopping monitor")?;

    Ok(())
}
