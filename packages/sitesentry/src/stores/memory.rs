//! In-memory storage implementation for testing and single-process runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::store::{
    AlertStore, JobStore, SiteStore, SnapshotStore, VectorStore, WeightStore,
};
use crate::types::{
    AdaptiveWeights, Alert, AlertId, AlertStatus, Job, Site, SiteId, Snapshot, SnapshotId,
    StoredVector, Verdict, VectorId,
};

/// In-memory store backing every storage port. Data is lost on restart; use
/// the SQLite store for anything that must survive one.
#[derive(Default)]
pub struct MemoryStore {
    sites: RwLock<HashMap<SiteId, Site>>,
    snapshots: RwLock<Vec<Snapshot>>,
    alerts: RwLock<Vec<Alert>>,
    jobs: RwLock<HashMap<SiteId, Job>>,
    vectors: RwLock<HashMap<VectorId, StoredVector>>,
    weights: RwLock<HashMap<SiteId, AdaptiveWeights>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().unwrap().len()
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.read().unwrap().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().unwrap().len()
    }
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn put_site(&self, site: &Site) -> Result<()> {
        self.sites.write().unwrap().insert(site.id, site.clone());
        Ok(())
    }

    async fn get_site(&self, id: SiteId) -> Result<Option<Site>> {
        Ok(self.sites.read().unwrap().get(&id).cloned())
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let mut sites: Vec<Site> = self.sites.read().unwrap().values().cloned().collect();
        sites.sort_by_key(|s| s.created_at);
        Ok(sites)
    }

    async fn delete_site(&self, id: SiteId) -> Result<()> {
        self.sites.write().unwrap().remove(&id);
        self.snapshots.write().unwrap().retain(|s| s.site_id != id);
        self.alerts.write().unwrap().retain(|a| a.site_id != id);
        self.jobs.write().unwrap().remove(&id);
        self.vectors.write().unwrap().retain(|_, v| v.site_id != id);
        self.weights.write().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().unwrap();
        match snapshots.iter_mut().find(|s| s.id == snapshot.id) {
            Some(existing) => *existing = snapshot.clone(),
            None => snapshots.push(snapshot.clone()),
        }
        Ok(())
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().unwrap().iter().find(|s| s.id == id).cloned())
    }

    async fn latest_snapshot(&self, site_id: SiteId) -> Result<Option<Snapshot>> {
        Ok(self
            .snapshots
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.site_id == site_id)
            .max_by_key(|s| s.captured_at)
            .cloned())
    }

    async fn baseline_snapshot(&self, site_id: SiteId) -> Result<Option<Snapshot>> {
        Ok(self
            .snapshots
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.site_id == site_id && s.is_baseline_candidate())
            .max_by_key(|s| s.captured_at)
            .cloned())
    }

    async fn recent_snapshots(&self, site_id: SiteId, n: usize) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .snapshots
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.site_id == site_id)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| std::cmp::Reverse(s.captured_at));
        snapshots.truncate(n);
        Ok(snapshots)
    }

    async fn update_verdict(&self, id: SnapshotId, verdict: Verdict, confidence: f64) -> Result<()> {
        let mut snapshots = self.snapshots.write().unwrap();
        if let Some(snapshot) = snapshots.iter_mut().find(|s| s.id == id) {
            snapshot.verdict = Some(verdict);
            snapshot.confidence = Some(confidence);
        }
        Ok(())
    }

    async fn prune_snapshots(&self, site_id: SiteId, keep: usize) -> Result<usize> {
        let baseline_id = self.baseline_snapshot(site_id).await?.map(|s| s.id);

        let mut snapshots = self.snapshots.write().unwrap();
        let mut site_snapshots: Vec<(SnapshotId, chrono::DateTime<chrono::Utc>)> = snapshots
            .iter()
            .filter(|s| s.site_id == site_id)
            .map(|s| (s.id, s.captured_at))
            .collect();
        if site_snapshots.len() <= keep {
            return Ok(0);
        }

        // Oldest first; the baseline is exempt from eviction.
        site_snapshots.sort_by_key(|(_, captured_at)| *captured_at);
        let excess = site_snapshots.len() - keep;
        let evict: Vec<SnapshotId> = site_snapshots
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| Some(*id) != baseline_id)
            .take(excess)
            .collect();

        snapshots.retain(|s| !evict.contains(&s.id));
        // Vectors never outlive their snapshot.
        self.vectors.write().unwrap().retain(|_, v| !evict.contains(&v.snapshot_id));

        Ok(evict.len())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn put_alert(&self, alert: &Alert) -> Result<()> {
        let mut alerts = self.alerts.write().unwrap();
        match alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(existing) => *existing = alert.clone(),
            None => alerts.push(alert.clone()),
        }
        Ok(())
    }

    async fn open_alerts(&self, site_id: Option<SiteId>) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.status == AlertStatus::Open)
            .filter(|a| site_id.map(|id| a.site_id == id).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn set_alert_status(&self, id: AlertId, status: AlertStatus) -> Result<()> {
        let mut alerts = self.alerts.write().unwrap();
        if let Some(alert) = alerts.iter_mut().find(|a| a.id == id) {
            alert.status = status;
            alert.updated_at = chrono::Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn put_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().unwrap().insert(job.site_id, job.clone());
        Ok(())
    }

    async fn get_job(&self, site_id: SiteId) -> Result<Option<Job>> {
        Ok(self.jobs.read().unwrap().get(&site_id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.read().unwrap().values().cloned().collect())
    }

    async fn delete_job(&self, site_id: SiteId) -> Result<()> {
        self.jobs.write().unwrap().remove(&site_id);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn put_vector(&self, vector: &StoredVector) -> Result<()> {
        self.vectors.write().unwrap().insert(vector.id, vector.clone());
        Ok(())
    }

    async fn get_vector(&self, id: VectorId) -> Result<Option<StoredVector>> {
        Ok(self.vectors.read().unwrap().get(&id).cloned())
    }

    async fn vectors_for_snapshot(&self, snapshot_id: SnapshotId) -> Result<Vec<StoredVector>> {
        Ok(self
            .vectors
            .read()
            .unwrap()
            .values()
            .filter(|v| v.snapshot_id == snapshot_id)
            .cloned()
            .collect())
    }

    async fn delete_vectors_for_snapshot(&self, snapshot_id: SnapshotId) -> Result<()> {
        self.vectors.write().unwrap().retain(|_, v| v.snapshot_id != snapshot_id);
        Ok(())
    }
}

#[async_trait]
impl WeightStore for MemoryStore {
    async fn get_weights(&self, site_id: SiteId) -> Result<Option<AdaptiveWeights>> {
        Ok(self.weights.read().unwrap().get(&site_id).cloned())
    }

    async fn put_weights(&self, site_id: SiteId, weights: &AdaptiveWeights) -> Result<()> {
        self.weights.write().unwrap().insert(site_id, weights.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FingerprintSet, VectorKind};
    use chrono::{Duration, Utc};

    fn fingerprints(tag: &str) -> FingerprintSet {
        FingerprintSet {
            content_hash: format!("c-{tag}"),
            structure_hash: format!("s-{tag}"),
            text_block_hash: format!("t-{tag}"),
            semantic_hash: format!("m-{tag}"),
        }
    }

    fn snapshot(site_id: SiteId, offset_secs: i64, verdict: Option<Verdict>) -> Snapshot {
        let mut snap = Snapshot::new(
            site_id,
            Utc::now() + Duration::seconds(offset_secs),
            200,
            50,
            "text".into(),
            fingerprints("x"),
        );
        snap.verdict = verdict;
        snap
    }

    #[tokio::test]
    async fn baseline_is_newest_benign_or_initial() {
        let store = MemoryStore::new();
        let site_id = SiteId::new();

        store.put_snapshot(&snapshot(site_id, 0, Some(Verdict::Initial))).await.unwrap();
        store.put_snapshot(&snapshot(site_id, 10, Some(Verdict::Benign))).await.unwrap();
        store.put_snapshot(&snapshot(site_id, 20, Some(Verdict::Defacement))).await.unwrap();

        let baseline = store.baseline_snapshot(site_id).await.unwrap().unwrap();
        assert_eq!(baseline.verdict, Some(Verdict::Benign));

        let latest = store.latest_snapshot(site_id).await.unwrap().unwrap();
        assert_eq!(latest.verdict, Some(Verdict::Defacement));
    }

    #[tokio::test]
    async fn prune_keeps_newest_and_baseline() {
        let store = MemoryStore::new();
        let site_id = SiteId::new();

        // Baseline is the oldest snapshot; it must survive pruning.
        store.put_snapshot(&snapshot(site_id, 0, Some(Verdict::Benign))).await.unwrap();
        for i in 1..=5 {
            store
                .put_snapshot(&snapshot(site_id, i * 10, Some(Verdict::Unclear)))
                .await
                .unwrap();
        }

        let pruned = store.prune_snapshots(site_id, 3).await.unwrap();
        assert_eq!(pruned, 3);

        let remaining = store.recent_snapshots(site_id, 10).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(store.baseline_snapshot(site_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn prune_removes_vectors_with_snapshots() {
        let store = MemoryStore::new();
        let site_id = SiteId::new();

        let old = snapshot(site_id, 0, Some(Verdict::Unclear));
        let old_id = old.id;
        store.put_snapshot(&old).await.unwrap();
        store
            .put_vector(&StoredVector::new(site_id, old_id, VectorKind::Main, vec![1.0]))
            .await
            .unwrap();

        for i in 1..=3 {
            store
                .put_snapshot(&snapshot(site_id, i * 10, Some(Verdict::Benign)))
                .await
                .unwrap();
        }

        store.prune_snapshots(site_id, 2).await.unwrap();
        assert!(store.get_snapshot(old_id).await.unwrap().is_none());
        assert!(store.vectors_for_snapshot(old_id).await.unwrap().is_empty());
        assert_eq!(store.vector_count(), 0);
    }

    #[tokio::test]
    async fn site_delete_cascades() {
        let store = MemoryStore::new();
        let site = Site::new(
            "https://a.example",
            "A",
            crate::types::Schedule::parse("5m").unwrap(),
        );
        let site_id = site.id;
        store.put_site(&site).await.unwrap();

        let snap = snapshot(site_id, 0, Some(Verdict::Benign));
        let snap_id = snap.id;
        store.put_snapshot(&snap).await.unwrap();
        store
            .put_vector(&StoredVector::new(site_id, snap_id, VectorKind::Main, vec![1.0]))
            .await
            .unwrap();
        store
            .put_alert(&Alert::new(
                site_id,
                crate::types::AlertKind::Suspicious,
                crate::types::AlertSeverity::Low,
                "t",
                "d",
                Utc::now(),
            ))
            .await
            .unwrap();

        store.delete_site(site_id).await.unwrap();
        assert!(store.get_site(site_id).await.unwrap().is_none());
        assert_eq!(store.snapshot_count(), 0);
        assert_eq!(store.vector_count(), 0);
        assert_eq!(store.alert_count(), 0);
    }

    #[tokio::test]
    async fn open_alerts_filters_by_status_and_site() {
        let store = MemoryStore::new();
        let site_id = SiteId::new();

        let alert = Alert::new(
            site_id,
            crate::types::AlertKind::Defacement,
            crate::types::AlertSeverity::High,
            "t",
            "d",
            Utc::now(),
        );
        let alert_id = alert.id;
        store.put_alert(&alert).await.unwrap();

        assert_eq!(store.open_alerts(Some(site_id)).await.unwrap().len(), 1);
        assert_eq!(store.open_alerts(Some(SiteId::new())).await.unwrap().len(), 0);

        store.set_alert_status(alert_id, AlertStatus::Resolved).await.unwrap();
        assert!(store.open_alerts(None).await.unwrap().is_empty());
    }
}
