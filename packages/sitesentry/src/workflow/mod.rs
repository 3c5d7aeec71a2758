//! Per-check workflow.
//!
//! Executes the check DAG (fetch → extract → {detect ∥ vectorize} →
//! classify? → persist → alert) with partial-failure semantics:
//!
//! - fetch failure feeds site-down accounting; only the site-down alert runs
//! - extract failure is fatal to the check
//! - vectorize failure is non-fatal; classification proceeds without vectors
//! - classify failure yields verdict unclear at confidence zero
//! - persist is retried once, then the failure surfaces to the scheduler
//!
//! The whole check runs under a total deadline and the scheduler's
//! cancellation token.

mod report;

pub use report::{CheckContext, CheckReport, CheckRunner};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::classify::{ClassificationInput, ClassificationPipeline};
use crate::config::MonitorConfig;
use crate::detect::{ChangeClass, ChangeClassification, ChangeDetector};
use crate::error::{FetchError, MonitorError, Result};
use crate::extract::{keyword_set, ContentExtractor, ExtractedDocument};
use crate::scheduler::clock::Clock;
use crate::traits::{
    AlertNotifier, AlertStore, Embedder, FetchOutcome, LlmClassifier, MonitorStore, PageFetcher,
    SnapshotStore, VectorStore, WeightStore,
};
use crate::types::{
    AdaptiveWeights, Alert, AlertKind, AlertSeverity, ExtractedContent, Site, Snapshot,
    SnapshotId, StoredVector, Verdict, VectorKind,
};
use crate::vectorize::{SnapshotVectors, Vectorizer};

/// Trailing snapshots inspected for the historical false-positive proxy.
const HISTORY_WINDOW: usize = 20;

pub struct WorkflowEngine {
    fetcher: Arc<dyn PageFetcher>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MonitorStore>,
    notifier: Arc<dyn AlertNotifier>,
    clock: Arc<dyn Clock>,
    extractor: ContentExtractor,
    detector: ChangeDetector,
    vectorizer: Vectorizer,
    pipeline: ClassificationPipeline,
    config: MonitorConfig,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MonitorConfig,
        fetcher: Arc<dyn PageFetcher>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClassifier>,
        store: Arc<dyn MonitorStore>,
        notifier: Arc<dyn AlertNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            extractor: ContentExtractor::new(&config.extractor),
            detector: ChangeDetector::new(config.detector),
            vectorizer: Vectorizer::new(config.vectorizer),
            pipeline: ClassificationPipeline::new(&config.classifier, config.breaker, llm),
            fetcher,
            embedder,
            store,
            notifier,
            clock,
            config,
        }
    }

    async fn execute(&self, ctx: &CheckContext) -> Result<CheckReport> {
        let started = Instant::now();
        let site = &ctx.site;
        let captured_at = self.clock.now();

        // --- fetch -----------------------------------------------------
        let outcome = match self
            .fetcher
            .fetch(&site.url, self.config.fetch_timeout())
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.handle_fetch_failure(ctx, &err).await;
                return Err(MonitorError::Fetch(err));
            }
        };
        debug!(
            site_id = %site.id,
            status = outcome.http_status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "fetch complete"
        );

        // --- extract ---------------------------------------------------
        let document = self.extractor.extract(&outcome.raw_html, &site.url).map_err(|e| {
            warn!(site_id = %site.id, error = %e, "extraction failed; aborting check");
            MonitorError::Extract(e)
        })?;

        // --- baseline --------------------------------------------------
        let baseline_snapshot = self.store.baseline_snapshot(site.id).await?;
        let baseline_document = baseline_snapshot.as_ref().map(|snap| self.rehydrate(snap));
        let baseline_vectors = match &baseline_snapshot {
            Some(snap) => self.load_vectors(snap.id).await?,
            None => SnapshotVectors::default(),
        };

        // --- detect ∥ vectorize ---------------------------------------
        let (change, new_vectors) = tokio::join!(
            async {
                baseline_document.as_ref().map(|baseline| {
                    self.detector.detect(baseline, &document, &site.detector_overrides)
                })
            },
            self.vectorizer.vectorize(self.embedder.as_ref(), &document.content),
        );

        // --- classify --------------------------------------------------
        let classification = match &change {
            Some(change) if change.class.needs_classification() => {
                let weights = self.store.get_weights(site.id).await?.unwrap_or_else(|| {
                    AdaptiveWeights::with_base(self.config.classifier.base_weights)
                });
                let fp_rate = self.historical_false_positive_rate(site).await;
                Some(
                    self.pipeline
                        .classify(ClassificationInput {
                            site_url: &site.url,
                            baseline_content: baseline_document.as_ref().map(|d| &d.content),
                            new_content: &document.content,
                            baseline_vectors: &baseline_vectors,
                            new_vectors: &new_vectors,
                            prior_verdict: baseline_snapshot.as_ref().and_then(|s| s.verdict),
                            weights: weights.weights,
                            historical_false_positive_rate: fp_rate,
                            now: captured_at,
                        })
                        .await,
                )
            }
            _ => None,
        };

        let verdict = match (&change, &classification) {
            (None, _) => Verdict::Initial,
            (Some(c), _) if c.class == ChangeClass::Unchanged => baseline_snapshot
                .as_ref()
                .and_then(|s| s.verdict)
                .unwrap_or(Verdict::Benign),
            (Some(c), _) if c.class == ChangeClass::Minor => Verdict::Benign,
            (_, Some(result)) => result.verdict,
            // Classifier unavailable for a change that needed it
            (_, None) => Verdict::Unclear,
        };
        let confidence = match &classification {
            Some(result) => result.confidence,
            None => 1.0,
        };

        // --- persist ---------------------------------------------------
        let snapshot_id = self
            .persist(
                ctx,
                &outcome,
                &document,
                &new_vectors,
                &change,
                &classification,
                verdict,
                confidence,
                captured_at,
            )
            .await?;

        // --- alert -----------------------------------------------------
        let alerted = self
            .maybe_alert(site, snapshot_id, verdict, confidence, &change, &classification)
            .await?;

        info!(
            site_id = %site.id,
            execution_id = %ctx.execution_id,
            verdict = verdict.as_str(),
            change = ?change.as_ref().map(|c| c.class),
            alerted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "check complete"
        );

        Ok(CheckReport {
            execution_id: ctx.execution_id,
            site_id: site.id,
            snapshot_id: Some(snapshot_id),
            change,
            verdict: Some(verdict),
            confidence: Some(confidence),
            alerted,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Rebuild the baseline's extracted content. Raw HTML is persisted with
    /// every snapshot, so this is normally a full re-extract; without it the
    /// keyword set is rebuilt from the stored text and the outline is left
    /// empty (the detector falls back to structure-hash equality).
    fn rehydrate(&self, snapshot: &Snapshot) -> ExtractedDocument {
        if let Some(raw_html) = &snapshot.raw_html {
            if let Ok(mut document) = self.extractor.extract(raw_html, "") {
                document.fingerprints = snapshot.fingerprints.clone();
                return document;
            }
        }

        ExtractedDocument {
            content: ExtractedContent {
                normalized_text: snapshot.extracted_text.clone(),
                keywords: keyword_set(&snapshot.extracted_text),
                ..Default::default()
            },
            fingerprints: snapshot.fingerprints.clone(),
            truncated: snapshot.truncated,
        }
    }

    async fn load_vectors(&self, snapshot_id: SnapshotId) -> Result<SnapshotVectors> {
        let mut vectors = SnapshotVectors::default();
        for stored in self.store.vectors_for_snapshot(snapshot_id).await? {
            vectors.set(stored.kind, stored.payload);
        }
        Ok(vectors)
    }

    /// Adverse verdicts immediately followed by a benign one are counted as
    /// false positives over the trailing window.
    async fn historical_false_positive_rate(&self, site: &Site) -> f64 {
        let Ok(snapshots) = self.store.recent_snapshots(site.id, HISTORY_WINDOW).await else {
            return 0.0;
        };

        let mut adverse = 0usize;
        let mut reverted = 0usize;
        // newest first: window[0] follows window[1]
        for window in snapshots.windows(2) {
            if let Some(verdict) = window[1].verdict {
                if matches!(verdict, Verdict::Suspicious | Verdict::Defacement) {
                    adverse += 1;
                    if window[0].verdict.map(|v| v.is_baseline()).unwrap_or(false) {
                        reverted += 1;
                    }
                }
            }
        }

        if adverse == 0 {
            0.0
        } else {
            reverted as f64 / adverse as f64
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        ctx: &CheckContext,
        outcome: &FetchOutcome,
        document: &ExtractedDocument,
        new_vectors: &SnapshotVectors,
        change: &Option<ChangeClassification>,
        classification: &Option<crate::types::ClassificationResult>,
        verdict: Verdict,
        confidence: f64,
        captured_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<SnapshotId> {
        let site = &ctx.site;
        let mut snapshot = Snapshot::new(
            site.id,
            captured_at,
            outcome.http_status,
            outcome.elapsed.as_millis() as u64,
            document.content.normalized_text.clone(),
            document.fingerprints.clone(),
        )
        .with_raw_html(outcome.raw_html.clone())
        .with_truncated(document.truncated);

        snapshot.prev_similarity = change.as_ref().map(|c| c.keyword_similarity);
        snapshot.verdict = Some(verdict);
        snapshot.confidence = Some(confidence);

        let mut vectors = Vec::new();
        for kind in new_vectors.present_kinds() {
            if let Some(payload) = new_vectors.get(kind) {
                let stored = StoredVector::new(site.id, snapshot.id, kind, payload.clone());
                if kind == VectorKind::Main {
                    snapshot.vector_ref = Some(stored.id);
                }
                vectors.push(stored);
            }
        }

        // Persist is retried once before the failure surfaces to the
        // scheduler as a failed job.
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.persist_once(&snapshot, &vectors, classification, ctx).await {
                Ok(()) => break,
                Err(e) if attempt == 1 => {
                    warn!(site_id = %site.id, error = %e, "persist failed; retrying once");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(snapshot.id)
    }

    async fn persist_once(
        &self,
        snapshot: &Snapshot,
        vectors: &[StoredVector],
        classification: &Option<crate::types::ClassificationResult>,
        ctx: &CheckContext,
    ) -> Result<()> {
        let site = &ctx.site;
        self.store.put_snapshot(snapshot).await?;
        for vector in vectors {
            self.store.put_vector(vector).await?;
        }

        // Adaptive weights move only here, keeping read-modify-write races
        // out of the hot path.
        if let Some(result) = classification {
            let mut weights = self.store.get_weights(site.id).await?.unwrap_or_else(|| {
                AdaptiveWeights::with_base(self.config.classifier.base_weights)
            });
            weights.observe(result.agreement);
            self.store.put_weights(site.id, &weights).await?;
        }

        let keep = site.keep_scans.unwrap_or(self.config.storage.keep_scans);
        if keep > 0 {
            let pruned = self.store.prune_snapshots(site.id, keep as usize).await?;
            if pruned > 0 {
                debug!(site_id = %site.id, pruned, "old snapshots evicted");
            }
        }

        Ok(())
    }

    async fn maybe_alert(
        &self,
        site: &Site,
        snapshot_id: SnapshotId,
        verdict: Verdict,
        confidence: f64,
        change: &Option<ChangeClassification>,
        classification: &Option<crate::types::ClassificationResult>,
    ) -> Result<bool> {
        // Minor and unchanged checks never alert; an unclear verdict on a
        // classified change flags the ambiguity at low severity.
        let (kind, severity) = match verdict {
            Verdict::Defacement => (AlertKind::Defacement, AlertSeverity::High),
            Verdict::Suspicious => (AlertKind::Suspicious, AlertSeverity::Medium),
            Verdict::Unclear if classification.is_some() => {
                (AlertKind::Suspicious, AlertSeverity::Low)
            }
            _ => return Ok(false),
        };

        let description = classification
            .as_ref()
            .map(|c| c.reasoning.clone())
            .unwrap_or_else(|| format!("{} change detected", verdict));

        let mut alert = Alert::new(
            site.id,
            kind,
            severity,
            format!("{}: {}", site.display_name, verdict),
            description,
            self.clock.now(),
        )
        .with_snapshot(snapshot_id)
        .with_verdict(verdict.as_str(), confidence);

        if let Some(change) = change {
            alert = alert.with_similarity(change.keyword_similarity);
        }

        self.store.put_alert(&alert).await?;
        self.notifier.emit(alert);
        Ok(true)
    }

    /// Transient fetch failures accumulate toward a site-down alert, emitted
    /// exactly once when the run of failures reaches the breaker threshold.
    async fn handle_fetch_failure(&self, ctx: &CheckContext, error: &FetchError) {
        let site = &ctx.site;
        warn!(site_id = %site.id, error = %error, "fetch failed");

        if !error.is_transient() {
            return;
        }

        let failures_including_this = ctx.consecutive_failures + 1;
        if failures_including_this != self.config.breaker.failure_threshold {
            return;
        }

        let alert = Alert::new(
            site.id,
            AlertKind::SiteDown,
            AlertSeverity::Critical,
            format!("{}: site down", site.display_name),
            format!(
                "{} consecutive fetch failures; latest: {}",
                failures_including_this, error
            ),
            self.clock.now(),
        );

        if let Err(e) = self.store.put_alert(&alert).await {
            warn!(site_id = %site.id, error = %e, "failed to persist site-down alert");
        }
        self.notifier.emit(alert);
    }
}

#[async_trait]
impl CheckRunner for WorkflowEngine {
    /// Run one check under the total deadline and the scheduler's
    /// cancellation token.
    async fn run_check(&self, ctx: CheckContext) -> Result<CheckReport> {
        let deadline = self.config.total_deadline();
        let cancelled = ctx.cancel.clone();

        tokio::select! {
            _ = cancelled.cancelled() => Err(MonitorError::Cancelled),
            result = tokio::time::timeout(deadline, self.execute(&ctx)) => match result {
                Ok(inner) => inner,
                Err(_) => Err(MonitorError::DeadlineExceeded {
                    elapsed_ms: deadline.as_millis() as u64,
                }),
            },
        }
    }
}
