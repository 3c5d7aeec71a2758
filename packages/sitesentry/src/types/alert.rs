use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::site::SiteId;
use super::snapshot::SnapshotId;

/// Unique identifier for an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Defacement,
    Suspicious,
    SiteDown,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Defacement => "defacement",
            AlertKind::Suspicious => "suspicious",
            AlertKind::SiteDown => "site_down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Alert lifecycle; the engine only ever creates `Open` alerts. Transitions
/// are operator actions outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Open,
    Acknowledged,
    Resolved,
}

/// An adverse finding emitted on defacement/suspicious verdicts or sustained
/// fetch failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub site_id: SiteId,
    pub snapshot_id: Option<SnapshotId>,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub verdict_label: Option<String>,
    pub confidence: Option<f64>,
    pub similarity: Option<f64>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        site_id: SiteId,
        kind: AlertKind,
        severity: AlertSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            site_id,
            snapshot_id: None,
            kind,
            severity,
            title: title.into(),
            description: description.into(),
            verdict_label: None,
            confidence: None,
            similarity: None,
            status: AlertStatus::Open,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_snapshot(mut self, snapshot_id: SnapshotId) -> Self {
        self.snapshot_id = Some(snapshot_id);
        self
    }

    pub fn with_verdict(mut self, label: impl Into<String>, confidence: f64) -> Self {
        self.verdict_label = Some(label.into());
        self.confidence = Some(confidence);
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }
}
