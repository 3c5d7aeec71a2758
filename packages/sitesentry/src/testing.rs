//! Mock port implementations for tests.
//!
//! Deterministic, configurable, with call tracking for assertions. No real
//! network, browser or model calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{FetchError, FetchResult, LlmError, LlmResult, MonitorError, Result};
use crate::traits::{
    AlertNotifier, Embedder, FetchOutcome, LlmClassifier, LlmVerdict, PageFetcher, PromptContext,
    RenderTimings,
};
use crate::types::{Alert, Verdict, VectorKind};
use crate::workflow::{CheckContext, CheckReport, CheckRunner};

// ============================================================================
// MockFetcher
// ============================================================================

/// Serves canned HTML per URL, or scripted sequences of outcomes.
#[derive(Default)]
pub struct MockFetcher {
    pages: RwLock<HashMap<String, String>>,
    scripted: Mutex<HashMap<String, VecDeque<FetchResult<String>>>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always serve this HTML for the URL.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.write().unwrap().insert(url.into(), html.into());
        self
    }

    /// Queue scripted outcomes consumed in order; once drained, the static
    /// page (if any) takes over.
    pub fn with_script(
        self,
        url: impl Into<String>,
        outcomes: Vec<FetchResult<String>>,
    ) -> Self {
        self.scripted.lock().unwrap().insert(url.into(), outcomes.into());
        self
    }

    /// Replace the static page for a URL mid-test.
    pub fn set_page(&self, url: impl Into<String>, html: impl Into<String>) {
        self.pages.write().unwrap().insert(url.into(), html.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str, _deadline: Duration) -> FetchResult<FetchOutcome> {
        self.calls.lock().unwrap().push(url.to_string());

        if let Some(queue) = self.scripted.lock().unwrap().get_mut(url) {
            if let Some(outcome) = queue.pop_front() {
                return outcome.map(|html| success(url, html));
            }
        }

        match self.pages.read().unwrap().get(url) {
            Some(html) => Ok(success(url, html.clone())),
            None => Err(FetchError::Http { url: url.to_string(), status: 404 }),
        }
    }
}

fn success(url: &str, raw_html: String) -> FetchOutcome {
    FetchOutcome {
        raw_html,
        http_status: 200,
        final_url: url.to_string(),
        elapsed: Duration::from_millis(12),
        render_timings: RenderTimings { navigation_ms: 8, content_ms: 12 },
    }
}

// ============================================================================
// MockEmbedder
// ============================================================================

/// Deterministic bag-of-words embedder: similar texts embed close together,
/// disjoint texts embed nearly orthogonal. No model involved.
pub struct MockEmbedder {
    dimension: usize,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, failing: AtomicBool::new(false), calls: AtomicUsize::new(0) }
    }

    /// Every embed call fails until healed.
    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn token_slot(&self, token: &str) -> usize {
        // FNV-1a keeps the mapping stable across runs.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str, _kind: VectorKind) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::Embedding("mock embedder failing".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            vector[self.token_slot(token)] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// MockLlm
// ============================================================================

enum LlmBehavior {
    Reply { verdict: Verdict, confidence: f64, reasoning: String },
    RateLimited,
    Hang,
}

/// Scripted LLM classifier.
pub struct MockLlm {
    behavior: LlmBehavior,
    calls: Mutex<Vec<PromptContext>>,
}

impl MockLlm {
    pub fn replying(verdict: Verdict, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            behavior: LlmBehavior::Reply { verdict, confidence, reasoning: reasoning.into() },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rate_limited() -> Self {
        Self { behavior: LlmBehavior::RateLimited, calls: Mutex::new(Vec::new()) }
    }

    /// Never replies; exercises the timeout path.
    pub fn hanging() -> Self {
        Self { behavior: LlmBehavior::Hang, calls: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClassifier for MockLlm {
    async fn classify(&self, context: &PromptContext) -> LlmResult<LlmVerdict> {
        self.calls.lock().unwrap().push(context.clone());
        match &self.behavior {
            LlmBehavior::Reply { verdict, confidence, reasoning } => Ok(LlmVerdict {
                verdict: *verdict,
                confidence: *confidence,
                reasoning: reasoning.clone(),
            }),
            LlmBehavior::RateLimited => Err(LlmError::RateLimited),
            LlmBehavior::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

// ============================================================================
// CapturingNotifier
// ============================================================================

/// Captures emitted alerts for assertions.
#[derive(Default, Clone)]
pub struct CapturingNotifier {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl CapturingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertNotifier for CapturingNotifier {
    fn emit(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

// ============================================================================
// RecordingRunner
// ============================================================================

enum RunnerBehavior {
    Instant,
    Slow(Duration),
    FailTransient,
}

/// Check runner for scheduler tests: records starts, tracks the maximum
/// concurrency observed, optionally fails or dawdles.
pub struct RecordingRunner {
    behavior: RunnerBehavior,
    healed: AtomicBool,
    started: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    executions: Mutex<Vec<Uuid>>,
}

impl RecordingRunner {
    fn with_behavior(behavior: RunnerBehavior) -> Self {
        Self {
            behavior,
            healed: AtomicBool::new(false),
            started: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            executions: Mutex::new(Vec::new()),
        }
    }

    pub fn instant() -> Self {
        Self::with_behavior(RunnerBehavior::Instant)
    }

    pub fn slow(delay: Duration) -> Self {
        Self::with_behavior(RunnerBehavior::Slow(delay))
    }

    /// Fails every check with a transient fetch error until healed.
    pub fn failing_transient() -> Self {
        Self::with_behavior(RunnerBehavior::FailTransient)
    }

    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn saw_execution(&self, execution_id: Uuid) -> bool {
        self.executions.lock().unwrap().contains(&execution_id)
    }
}

#[async_trait]
impl CheckRunner for RecordingRunner {
    async fn run_check(&self, ctx: CheckContext) -> Result<CheckReport> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(current, Ordering::SeqCst);
        self.executions.lock().unwrap().push(ctx.execution_id);

        if let RunnerBehavior::Slow(delay) = &self.behavior {
            tokio::time::sleep(*delay).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);

        if matches!(self.behavior, RunnerBehavior::FailTransient)
            && !self.healed.load(Ordering::SeqCst)
        {
            return Err(MonitorError::Fetch(FetchError::Timeout {
                url: ctx.site.url.clone(),
            }));
        }

        Ok(CheckReport {
            execution_id: ctx.execution_id,
            site_id: ctx.site.id,
            snapshot_id: None,
            change: None,
            verdict: Some(Verdict::Benign),
            confidence: Some(1.0),
            alerted: false,
            elapsed_ms: 1,
        })
    }
}
