use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::site::SiteId;
use super::snapshot::SnapshotId;

/// Unique identifier for a stored embedding vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorId(pub Uuid);

impl VectorId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for VectorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which projection of the page an embedding covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    Main,
    Title,
    TextBlocks,
    Meta,
    Combined,
}

impl VectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorKind::Main => "main",
            VectorKind::Title => "title",
            VectorKind::TextBlocks => "text_blocks",
            VectorKind::Meta => "meta",
            VectorKind::Combined => "combined",
        }
    }
}

impl std::fmt::Display for VectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted embedding. Lives no longer than its snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVector {
    pub id: VectorId,
    pub site_id: SiteId,
    pub snapshot_id: SnapshotId,
    pub kind: VectorKind,
    pub dimension: usize,
    pub payload: Vec<f32>,
}

impl StoredVector {
    pub fn new(site_id: SiteId, snapshot_id: SnapshotId, kind: VectorKind, payload: Vec<f32>) -> Self {
        Self {
            id: VectorId::new(),
            site_id,
            snapshot_id,
            kind,
            dimension: payload.len(),
            payload,
        }
    }
}
