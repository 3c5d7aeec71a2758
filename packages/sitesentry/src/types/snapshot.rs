use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::site::SiteId;
use super::vector::VectorId;

/// Unique identifier for a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Adjudicated classification of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// First snapshot of a site; serves as the initial baseline
    Initial,
    Benign,
    Suspicious,
    Defacement,
    Unclear,
}

impl Verdict {
    /// Snapshots with these verdicts are eligible to be a site's baseline.
    pub fn is_baseline(&self) -> bool {
        matches!(self, Verdict::Benign | Verdict::Initial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Initial => "initial",
            Verdict::Benign => "benign",
            Verdict::Suspicious => "suspicious",
            Verdict::Defacement => "defacement",
            Verdict::Unclear => "unclear",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four content fingerprints, each over a distinct projection of the
/// extracted content. Equality of any one implies equality of its projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSet {
    /// Blake3 of normalized text
    pub content_hash: String,
    /// Blake2b of the DOM outline tuples
    pub structure_hash: String,
    /// Blake2b of lexicographically sorted text blocks
    pub text_block_hash: String,
    /// Blake2b of normalized text with non-alphanumerics collapsed
    pub semantic_hash: String,
}

impl FingerprintSet {
    /// All four projections unchanged.
    pub fn matches(&self, other: &FingerprintSet) -> bool {
        self == other
    }
}

/// An immutable capture of a site's rendered state.
///
/// Verdict and confidence may be back-filled once by the classifier; every
/// other field is fixed at capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub site_id: SiteId,
    pub captured_at: DateTime<Utc>,
    pub http_status: u16,
    pub response_time_ms: u64,
    /// Raw page bytes; optional, large sites may omit it
    pub raw_html: Option<String>,
    pub extracted_text: String,
    pub fingerprints: FingerprintSet,
    /// Content exceeded the configured cap and was truncated before hashing
    pub truncated: bool,
    pub vector_ref: Option<VectorId>,
    /// Keyword similarity against the baseline at capture time
    pub prev_similarity: Option<f64>,
    pub verdict: Option<Verdict>,
    pub confidence: Option<f64>,
}

impl Snapshot {
    pub fn new(
        site_id: SiteId,
        captured_at: DateTime<Utc>,
        http_status: u16,
        response_time_ms: u64,
        extracted_text: String,
        fingerprints: FingerprintSet,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            site_id,
            captured_at,
            http_status,
            response_time_ms,
            raw_html: None,
            extracted_text,
            fingerprints,
            truncated: false,
            vector_ref: None,
            prev_similarity: None,
            verdict: None,
            confidence: None,
        }
    }

    pub fn with_raw_html(mut self, html: impl Into<String>) -> Self {
        self.raw_html = Some(html.into());
        self
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn is_baseline_candidate(&self) -> bool {
        self.verdict.map(|v| v.is_baseline()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprints(tag: &str) -> FingerprintSet {
        FingerprintSet {
            content_hash: format!("c-{tag}"),
            structure_hash: format!("s-{tag}"),
            text_block_hash: format!("t-{tag}"),
            semantic_hash: format!("m-{tag}"),
        }
    }

    #[test]
    fn identical_fingerprints_match() {
        assert!(fingerprints("a").matches(&fingerprints("a")));
        assert!(!fingerprints("a").matches(&fingerprints("b")));
    }

    #[test]
    fn baseline_verdicts() {
        assert!(Verdict::Initial.is_baseline());
        assert!(Verdict::Benign.is_baseline());
        assert!(!Verdict::Suspicious.is_baseline());
        assert!(!Verdict::Defacement.is_baseline());
        assert!(!Verdict::Unclear.is_baseline());
    }

    #[test]
    fn snapshot_without_verdict_is_not_baseline() {
        let snap = Snapshot::new(
            SiteId::new(),
            Utc::now(),
            200,
            120,
            "hello".into(),
            fingerprints("a"),
        );
        assert!(!snap.is_baseline_candidate());
    }
}
