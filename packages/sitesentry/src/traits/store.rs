//! Storage ports.
//!
//! The storage layer is split into focused traits: sites, snapshots, alerts,
//! jobs, vectors and adaptive weights. The composite [`MonitorStore`] is what
//! the workflow engine and orchestrator hold.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    AdaptiveWeights, Alert, AlertId, AlertStatus, Job, Site, SiteId, Snapshot, SnapshotId,
    StoredVector, Verdict, VectorId, VectorKind,
};

/// CRUD over monitored sites.
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn put_site(&self, site: &Site) -> Result<()>;

    async fn get_site(&self, id: SiteId) -> Result<Option<Site>>;

    async fn list_sites(&self) -> Result<Vec<Site>>;

    /// Removes the site; snapshots, vectors, alerts and job cascade.
    async fn delete_site(&self, id: SiteId) -> Result<()>;
}

/// Snapshot persistence and the baseline queries the detector depends on.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>>;

    /// Most recent snapshot for the site regardless of verdict.
    async fn latest_snapshot(&self, site_id: SiteId) -> Result<Option<Snapshot>>;

    /// Most recent snapshot whose verdict is benign or initial.
    async fn baseline_snapshot(&self, site_id: SiteId) -> Result<Option<Snapshot>>;

    /// Last `n` snapshots, newest first.
    async fn recent_snapshots(&self, site_id: SiteId, n: usize) -> Result<Vec<Snapshot>>;

    /// Back-fill the verdict and confidence on a persisted snapshot.
    async fn update_verdict(&self, id: SnapshotId, verdict: Verdict, confidence: f64) -> Result<()>;

    /// Evict snapshots beyond `keep` for the site, oldest first, together
    /// with their vectors. The current baseline is never evicted. Returns the
    /// number of snapshots removed.
    async fn prune_snapshots(&self, site_id: SiteId, keep: usize) -> Result<usize>;
}

/// Alert persistence. The engine creates alerts; operators mutate them
/// elsewhere.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn put_alert(&self, alert: &Alert) -> Result<()>;

    async fn open_alerts(&self, site_id: Option<SiteId>) -> Result<Vec<Alert>>;

    async fn set_alert_status(&self, id: AlertId, status: AlertStatus) -> Result<()>;
}

/// Job persistence for scheduler restarts and status queries.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, site_id: SiteId) -> Result<Option<Job>>;

    async fn list_jobs(&self) -> Result<Vec<Job>>;

    async fn delete_job(&self, site_id: SiteId) -> Result<()>;
}

/// Embedding persistence with cosine-similarity lookup.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn put_vector(&self, vector: &StoredVector) -> Result<()>;

    async fn get_vector(&self, id: VectorId) -> Result<Option<StoredVector>>;

    /// All vectors attached to a snapshot.
    async fn vectors_for_snapshot(&self, snapshot_id: SnapshotId) -> Result<Vec<StoredVector>>;

    /// The vector of a given kind for a snapshot, if present.
    async fn vector_for_snapshot(
        &self,
        snapshot_id: SnapshotId,
        kind: VectorKind,
    ) -> Result<Option<StoredVector>> {
        Ok(self
            .vectors_for_snapshot(snapshot_id)
            .await?
            .into_iter()
            .find(|v| v.kind == kind))
    }

    async fn delete_vectors_for_snapshot(&self, snapshot_id: SnapshotId) -> Result<()>;
}

/// Per-site adaptive ensemble weights, updated only during the persist step.
#[async_trait]
pub trait WeightStore: Send + Sync {
    async fn get_weights(&self, site_id: SiteId) -> Result<Option<AdaptiveWeights>>;

    async fn put_weights(&self, site_id: SiteId, weights: &AdaptiveWeights) -> Result<()>;
}

/// Composite storage trait the engine components hold.
pub trait MonitorStore:
    SiteStore + SnapshotStore + AlertStore + JobStore + VectorStore + WeightStore
{
}

// Blanket implementation: anything implementing all the focused traits is a
// MonitorStore.
impl<T: SiteStore + SnapshotStore + AlertStore + JobStore + VectorStore + WeightStore> MonitorStore
    for T
{
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn cosine_handles_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
