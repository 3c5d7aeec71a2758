//! Engine configuration.
//!
//! Every knob has a default; `MonitorConfig::from_env` overlays
//! `SITESENTRY_*` environment variables onto the defaults. The daemon loads
//! `.env` first (dotenvy) and passes the result down; the library never reads
//! the environment on its own after construction.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::EnsembleWeights;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Global cap on concurrently running checks
    pub max_concurrent_jobs: usize,
    /// Jobs missed by at most this many seconds still run; older misfires are
    /// dropped to the next fire time
    pub misfire_grace_seconds: u64,
    /// Scheduler tick resolution
    pub poll_interval_ms: u64,
    /// Bounded wait for in-flight workflows on shutdown
    pub drain_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            misfire_grace_seconds: 30,
            poll_interval_ms: 500,
            drain_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub pool_size: usize,
    /// Per-navigation timeout
    pub navigation_timeout_seconds: u64,
    /// Resource types blocked during navigation
    pub blocked_resources: Vec<String>,
    /// User agents rotated per fetch
    pub user_agents: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            navigation_timeout_seconds: 30,
            blocked_resources: vec!["image".to_string(), "media".to_string()],
            user_agents: default_user_agents(),
        }
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub similarity_threshold: f64,
    pub structural_threshold: f64,
    pub critical_change_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            structural_threshold: 0.90,
            critical_change_threshold: 0.50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_weights: EnsembleWeights,
    pub llm_timeout_seconds: u64,
    pub llm_max_tokens: u32,
    /// Rules score at or above which the rules verdict is defacement
    pub rules_defacement_threshold: f64,
    /// Rules score at or above which the rules verdict is suspicious
    pub rules_suspicious_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_weights: EnsembleWeights::default(),
            llm_timeout_seconds: 60,
            llm_max_tokens: 1024,
            rules_defacement_threshold: 0.85,
            rules_suspicious_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Texts are truncated to this many characters before embedding
    pub max_content_length: usize,
    /// Texts above this length are chunked on sentence boundaries and
    /// mean-pooled
    pub chunk_threshold: usize,
    pub dimension: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self { max_content_length: 32_000, chunk_threshold: 4_000, dimension: 1024 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 300_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout_seconds: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Tags whose subtrees are irrelevant to defacement detection
    pub ignored_tags: Vec<String>,
    /// Content above this size is truncated before hashing
    pub max_content_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ignored_tags: ["script", "style", "noscript", "nav", "header", "footer", "iframe", "svg"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_content_bytes: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshots kept per site before pruning; per-site override wins
    pub keep_scans: u32,
    /// Consecutive permanent 4xx responses before a site is marked degraded
    pub degraded_threshold: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { keep_scans: 50, degraded_threshold: 3 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Total per-check deadline
    pub total_deadline_seconds: u64,
    pub fetch_timeout_seconds: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { total_deadline_seconds: 120, fetch_timeout_seconds: 30 }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub scheduler: SchedulerConfig,
    pub browser: BrowserConfig,
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
    pub vectorizer: VectorizerConfig,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    pub extractor: ExtractorConfig,
    pub storage: StorageConfig,
    pub workflow: WorkflowConfig,
}

impl MonitorConfig {
    /// Defaults overlaid with `SITESENTRY_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        overlay(&mut config.scheduler.max_concurrent_jobs, "SITESENTRY_MAX_CONCURRENT_JOBS");
        overlay(&mut config.scheduler.misfire_grace_seconds, "SITESENTRY_MISFIRE_GRACE_SECONDS");
        overlay(&mut config.scheduler.drain_timeout_seconds, "SITESENTRY_DRAIN_TIMEOUT_SECONDS");
        overlay(&mut config.browser.pool_size, "SITESENTRY_BROWSER_POOL_SIZE");
        overlay(
            &mut config.browser.navigation_timeout_seconds,
            "SITESENTRY_NAVIGATION_TIMEOUT_SECONDS",
        );
        overlay(&mut config.detector.similarity_threshold, "SITESENTRY_SIMILARITY_THRESHOLD");
        overlay(&mut config.detector.structural_threshold, "SITESENTRY_STRUCTURAL_THRESHOLD");
        overlay(
            &mut config.detector.critical_change_threshold,
            "SITESENTRY_CRITICAL_CHANGE_THRESHOLD",
        );
        overlay(&mut config.classifier.llm_timeout_seconds, "SITESENTRY_LLM_TIMEOUT_SECONDS");
        overlay(&mut config.classifier.llm_max_tokens, "SITESENTRY_LLM_MAX_TOKENS");
        overlay(&mut config.vectorizer.max_content_length, "SITESENTRY_MAX_CONTENT_LENGTH");
        overlay(&mut config.vectorizer.chunk_threshold, "SITESENTRY_CHUNK_THRESHOLD");
        overlay(&mut config.vectorizer.dimension, "SITESENTRY_EMBEDDING_DIMENSION");
        overlay(&mut config.retry.max_attempts, "SITESENTRY_RETRY_MAX_ATTEMPTS");
        overlay(&mut config.retry.initial_delay_ms, "SITESENTRY_RETRY_INITIAL_DELAY_MS");
        overlay(&mut config.retry.max_delay_ms, "SITESENTRY_RETRY_MAX_DELAY_MS");
        overlay(&mut config.retry.exponential_base, "SITESENTRY_RETRY_EXPONENTIAL_BASE");
        overlay(&mut config.breaker.failure_threshold, "SITESENTRY_BREAKER_FAILURE_THRESHOLD");
        overlay(
            &mut config.breaker.recovery_timeout_seconds,
            "SITESENTRY_BREAKER_RECOVERY_TIMEOUT_SECONDS",
        );
        overlay(&mut config.storage.keep_scans, "SITESENTRY_KEEP_SCANS");
        overlay(&mut config.workflow.total_deadline_seconds, "SITESENTRY_CHECK_DEADLINE_SECONDS");
        overlay(&mut config.workflow.fetch_timeout_seconds, "SITESENTRY_FETCH_TIMEOUT_SECONDS");

        config
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.navigation_timeout_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow.fetch_timeout_seconds)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier.llm_timeout_seconds)
    }

    pub fn total_deadline(&self) -> Duration {
        Duration::from_secs(self.workflow.total_deadline_seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.drain_timeout_seconds)
    }
}

fn overlay<T: FromStr>(slot: &mut T, key: &str) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, raw = %raw, "ignoring unparseable config override"),
        }
    }
}
