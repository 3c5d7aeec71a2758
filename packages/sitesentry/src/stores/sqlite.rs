//! SQLite storage implementation.
//!
//! File-based backend for single-server deployments; `sqlite::memory:` works
//! for tests with persistent-store semantics. Schema is created on open.
//! Everything is stored in portable column types (TEXT/INTEGER/REAL/BLOB)
//! and converted at the edge, keeping the row structs dumb.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::traits::store::{
    AlertStore, JobStore, SiteStore, SnapshotStore, VectorStore, WeightStore,
};
use crate::types::{
    AdaptiveWeights, Alert, AlertId, AlertKind, AlertSeverity, AlertStatus, CheckPriority,
    FingerprintSet, Job, JobId, JobStatus, Schedule, Site, SiteId, Snapshot, SnapshotId,
    StoredVector, Verdict, VectorId, VectorKind,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(MonitorError::storage)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> Result<()> {
        for statement in [
            r#"
            CREATE TABLE IF NOT EXISTS sites (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                schedule TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                max_depth INTEGER NOT NULL DEFAULT 1,
                priority TEXT NOT NULL DEFAULT 'normal',
                detector_overrides TEXT NOT NULL DEFAULT '{}',
                keep_scans INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                site_id TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                http_status INTEGER NOT NULL,
                response_time_ms INTEGER NOT NULL,
                raw_html TEXT,
                extracted_text TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                structure_hash TEXT NOT NULL,
                text_block_hash TEXT NOT NULL,
                semantic_hash TEXT NOT NULL,
                truncated INTEGER NOT NULL DEFAULT 0,
                vector_ref TEXT,
                prev_similarity REAL,
                verdict TEXT,
                confidence REAL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_snapshots_site_captured
                ON snapshots(site_id, captured_at DESC)",
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                site_id TEXT NOT NULL,
                snapshot_id TEXT,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                verdict_label TEXT,
                confidence REAL,
                similarity REAL,
                status TEXT NOT NULL DEFAULT 'open',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_alerts_site_status ON alerts(site_id, status)",
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                site_id TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                next_run_at TEXT,
                last_run_at TEXT,
                last_success_at TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                status TEXT NOT NULL DEFAULT 'scheduled',
                priority TEXT NOT NULL DEFAULT 'normal',
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                consecutive_permanent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                site_id TEXT NOT NULL,
                snapshot_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                payload BLOB NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_vectors_snapshot ON vectors(snapshot_id)",
            "CREATE INDEX IF NOT EXISTS idx_vectors_site ON vectors(site_id)",
            r#"
            CREATE TABLE IF NOT EXISTS site_weights (
                site_id TEXT PRIMARY KEY,
                weights TEXT NOT NULL
            )
            "#,
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(MonitorError::storage)?;
        }
        Ok(())
    }
}

// ============================================================================
// Row structs and conversions
// ============================================================================

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(MonitorError::storage)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(MonitorError::storage)
}

fn parse_opt_time(raw: &Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(|r| parse_time(r)).transpose()
}

fn time_str(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn f32s_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn verdict_from_str(raw: &str) -> Result<Verdict> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(MonitorError::Json)
}

#[derive(FromRow)]
struct SiteRow {
    id: String,
    url: String,
    display_name: String,
    schedule: String,
    active: i64,
    max_depth: i64,
    priority: String,
    detector_overrides: String,
    keep_scans: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl SiteRow {
    fn into_site(self) -> Result<Site> {
        Ok(Site {
            id: SiteId(parse_uuid(&self.id)?),
            url: self.url,
            display_name: self.display_name,
            schedule: Schedule::parse(&self.schedule)?,
            active: self.active != 0,
            max_depth: self.max_depth as u8,
            priority: serde_json::from_value(serde_json::Value::String(self.priority))?,
            detector_overrides: serde_json::from_str(&self.detector_overrides)?,
            keep_scans: self.keep_scans.map(|k| k as u32),
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    id: String,
    site_id: String,
    captured_at: String,
    http_status: i64,
    response_time_ms: i64,
    raw_html: Option<String>,
    extracted_text: String,
    content_hash: String,
    structure_hash: String,
    text_block_hash: String,
    semantic_hash: String,
    truncated: i64,
    vector_ref: Option<String>,
    prev_similarity: Option<f64>,
    verdict: Option<String>,
    confidence: Option<f64>,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<Snapshot> {
        Ok(Snapshot {
            id: SnapshotId(parse_uuid(&self.id)?),
            site_id: SiteId(parse_uuid(&self.site_id)?),
            captured_at: parse_time(&self.captured_at)?,
            http_status: self.http_status as u16,
            response_time_ms: self.response_time_ms as u64,
            raw_html: self.raw_html,
            extracted_text: self.extracted_text,
            fingerprints: FingerprintSet {
                content_hash: self.content_hash,
                structure_hash: self.structure_hash,
                text_block_hash: self.text_block_hash,
                semantic_hash: self.semantic_hash,
            },
            truncated: self.truncated != 0,
            vector_ref: self
                .vector_ref
                .as_deref()
                .map(|r| parse_uuid(r).map(VectorId))
                .transpose()?,
            prev_similarity: self.prev_similarity,
            verdict: self.verdict.as_deref().map(verdict_from_str).transpose()?,
            confidence: self.confidence,
        })
    }
}

const SNAPSHOT_COLUMNS: &str = "id, site_id, captured_at, http_status, response_time_ms, raw_html, \
     extracted_text, content_hash, structure_hash, text_block_hash, semantic_hash, truncated, \
     vector_ref, prev_similarity, verdict, confidence";

#[derive(FromRow)]
struct AlertRow {
    id: String,
    site_id: String,
    snapshot_id: Option<String>,
    kind: String,
    severity: String,
    title: String,
    description: String,
    verdict_label: Option<String>,
    confidence: Option<f64>,
    similarity: Option<f64>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert> {
        let kind: AlertKind = serde_json::from_value(serde_json::Value::String(self.kind))?;
        let severity: AlertSeverity =
            serde_json::from_value(serde_json::Value::String(self.severity))?;
        let status: AlertStatus = serde_json::from_value(serde_json::Value::String(self.status))?;
        Ok(Alert {
            id: AlertId(parse_uuid(&self.id)?),
            site_id: SiteId(parse_uuid(&self.site_id)?),
            snapshot_id: self
                .snapshot_id
                .as_deref()
                .map(|r| parse_uuid(r).map(SnapshotId))
                .transpose()?,
            kind,
            severity,
            title: self.title,
            description: self.description,
            verdict_label: self.verdict_label,
            confidence: self.confidence,
            similarity: self.similarity,
            status,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct JobRow {
    site_id: String,
    id: String,
    next_run_at: Option<String>,
    last_run_at: Option<String>,
    last_success_at: Option<String>,
    retry_count: i64,
    max_retries: i64,
    status: String,
    priority: String,
    consecutive_failures: i64,
    consecutive_permanent: i64,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status: JobStatus = serde_json::from_value(serde_json::Value::String(self.status))?;
        let priority: CheckPriority =
            serde_json::from_value(serde_json::Value::String(self.priority))?;
        Ok(Job {
            id: JobId(parse_uuid(&self.id)?),
            site_id: SiteId(parse_uuid(&self.site_id)?),
            next_run_at: parse_opt_time(&self.next_run_at)?,
            last_run_at: parse_opt_time(&self.last_run_at)?,
            last_success_at: parse_opt_time(&self.last_success_at)?,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            status,
            priority,
            consecutive_failures: self.consecutive_failures as u32,
            consecutive_permanent: self.consecutive_permanent as u32,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct VectorRow {
    id: String,
    site_id: String,
    snapshot_id: String,
    kind: String,
    payload: Vec<u8>,
}

impl VectorRow {
    fn into_vector(self) -> Result<StoredVector> {
        let kind: VectorKind = serde_json::from_value(serde_json::Value::String(self.kind))?;
        let payload = bytes_to_f32s(&self.payload);
        Ok(StoredVector {
            id: VectorId(parse_uuid(&self.id)?),
            site_id: SiteId(parse_uuid(&self.site_id)?),
            snapshot_id: SnapshotId(parse_uuid(&self.snapshot_id)?),
            kind,
            dimension: payload.len(),
            payload,
        })
    }
}

fn enum_str<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl SiteStore for SqliteStore {
    async fn put_site(&self, site: &Site) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sites (id, url, display_name, schedule, active, max_depth, priority,
                               detector_overrides, keep_scans, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                url = excluded.url,
                display_name = excluded.display_name,
                schedule = excluded.schedule,
                active = excluded.active,
                max_depth = excluded.max_depth,
                priority = excluded.priority,
                detector_overrides = excluded.detector_overrides,
                keep_scans = excluded.keep_scans,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(site.id.0.to_string())
        .bind(&site.url)
        .bind(&site.display_name)
        .bind(site.schedule.to_string())
        .bind(site.active as i64)
        .bind(site.max_depth as i64)
        .bind(enum_str(&site.priority))
        .bind(serde_json::to_string(&site.detector_overrides)?)
        .bind(site.keep_scans.map(|k| k as i64))
        .bind(time_str(site.created_at))
        .bind(time_str(site.updated_at))
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        Ok(())
    }

    async fn get_site(&self, id: SiteId) -> Result<Option<Site>> {
        let row = sqlx::query_as::<_, SiteRow>("SELECT * FROM sites WHERE id = ?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        row.map(SiteRow::into_site).transpose()
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query_as::<_, SiteRow>("SELECT * FROM sites ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        rows.into_iter().map(SiteRow::into_site).collect()
    }

    async fn delete_site(&self, id: SiteId) -> Result<()> {
        let id = id.0.to_string();
        for statement in [
            "DELETE FROM vectors WHERE site_id = ?",
            "DELETE FROM snapshots WHERE site_id = ?",
            "DELETE FROM alerts WHERE site_id = ?",
            "DELETE FROM jobs WHERE site_id = ?",
            "DELETE FROM site_weights WHERE site_id = ?",
            "DELETE FROM sites WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(&id)
                .execute(&self.pool)
                .await
                .map_err(MonitorError::storage)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO snapshots
                (id, site_id, captured_at, http_status, response_time_ms, raw_html,
                 extracted_text, content_hash, structure_hash, text_block_hash, semantic_hash,
                 truncated, vector_ref, prev_similarity, verdict, confidence)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.id.0.to_string())
        .bind(snapshot.site_id.0.to_string())
        .bind(time_str(snapshot.captured_at))
        .bind(snapshot.http_status as i64)
        .bind(snapshot.response_time_ms as i64)
        .bind(&snapshot.raw_html)
        .bind(&snapshot.extracted_text)
        .bind(&snapshot.fingerprints.content_hash)
        .bind(&snapshot.fingerprints.structure_hash)
        .bind(&snapshot.fingerprints.text_block_hash)
        .bind(&snapshot.fingerprints.semantic_hash)
        .bind(snapshot.truncated as i64)
        .bind(snapshot.vector_ref.map(|v| v.0.to_string()))
        .bind(snapshot.prev_similarity)
        .bind(snapshot.verdict.map(|v| enum_str(&v)))
        .bind(snapshot.confidence)
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        Ok(())
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        let query = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?");
        let row = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn latest_snapshot(&self, site_id: SiteId) -> Result<Option<Snapshot>> {
        let query = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE site_id = ?
             ORDER BY captured_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(site_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn baseline_snapshot(&self, site_id: SiteId) -> Result<Option<Snapshot>> {
        let query = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE site_id = ? AND verdict IN ('benign', 'initial')
             ORDER BY captured_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(site_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn recent_snapshots(&self, site_id: SiteId, n: usize) -> Result<Vec<Snapshot>> {
        let query = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE site_id = ?
             ORDER BY captured_at DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(site_id.0.to_string())
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn update_verdict(&self, id: SnapshotId, verdict: Verdict, confidence: f64) -> Result<()> {
        sqlx::query("UPDATE snapshots SET verdict = ?, confidence = ? WHERE id = ?")
            .bind(enum_str(&verdict))
            .bind(confidence)
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        Ok(())
    }

    async fn prune_snapshots(&self, site_id: SiteId, keep: usize) -> Result<usize> {
        let baseline_id = self.baseline_snapshot(site_id).await?.map(|s| s.id.0.to_string());

        // Evict oldest beyond `keep`, sparing the baseline; vectors go in the
        // same pass.
        let result = sqlx::query(
            r#"
            DELETE FROM snapshots
            WHERE site_id = ?
              AND (? IS NULL OR id != ?)
              AND id NOT IN (
                  SELECT id FROM snapshots WHERE site_id = ?
                  ORDER BY captured_at DESC LIMIT ?
              )
            "#,
        )
        .bind(site_id.0.to_string())
        .bind(&baseline_id)
        .bind(&baseline_id)
        .bind(site_id.0.to_string())
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;

        sqlx::query(
            "DELETE FROM vectors WHERE site_id = ?
             AND snapshot_id NOT IN (SELECT id FROM snapshots WHERE site_id = ?)",
        )
        .bind(site_id.0.to_string())
        .bind(site_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;

        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn put_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO alerts
                (id, site_id, snapshot_id, kind, severity, title, description,
                 verdict_label, confidence, similarity, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.id.0.to_string())
        .bind(alert.site_id.0.to_string())
        .bind(alert.snapshot_id.map(|s| s.0.to_string()))
        .bind(enum_str(&alert.kind))
        .bind(enum_str(&alert.severity))
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(&alert.verdict_label)
        .bind(alert.confidence)
        .bind(alert.similarity)
        .bind(enum_str(&alert.status))
        .bind(time_str(alert.created_at))
        .bind(time_str(alert.updated_at))
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        Ok(())
    }

    async fn open_alerts(&self, site_id: Option<SiteId>) -> Result<Vec<Alert>> {
        let rows = match site_id {
            Some(site_id) => {
                sqlx::query_as::<_, AlertRow>(
                    "SELECT * FROM alerts WHERE status = 'open' AND site_id = ?
                     ORDER BY created_at DESC",
                )
                .bind(site_id.0.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, AlertRow>(
                    "SELECT * FROM alerts WHERE status = 'open' ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(MonitorError::storage)?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    async fn set_alert_status(&self, id: AlertId, status: AlertStatus) -> Result<()> {
        sqlx::query("UPDATE alerts SET status = ?, updated_at = ? WHERE id = ?")
            .bind(enum_str(&status))
            .bind(time_str(Utc::now()))
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn put_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO jobs
                (site_id, id, next_run_at, last_run_at, last_success_at, retry_count,
                 max_retries, status, priority, consecutive_failures, consecutive_permanent,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.site_id.0.to_string())
        .bind(job.id.0.to_string())
        .bind(job.next_run_at.map(time_str))
        .bind(job.last_run_at.map(time_str))
        .bind(job.last_success_at.map(time_str))
        .bind(job.retry_count as i64)
        .bind(job.max_retries as i64)
        .bind(enum_str(&job.status))
        .bind(enum_str(&job.priority))
        .bind(job.consecutive_failures as i64)
        .bind(job.consecutive_permanent as i64)
        .bind(time_str(job.created_at))
        .bind(time_str(job.updated_at))
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        Ok(())
    }

    async fn get_job(&self, site_id: SiteId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE site_id = ?")
            .bind(site_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        row.map(JobRow::into_job).transpose()
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs")
            .fetch_all(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn delete_job(&self, site_id: SiteId) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE site_id = ?")
            .bind(site_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn put_vector(&self, vector: &StoredVector) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO vectors (id, site_id, snapshot_id, kind, dimension, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(vector.id.0.to_string())
        .bind(vector.site_id.0.to_string())
        .bind(vector.snapshot_id.0.to_string())
        .bind(enum_str(&vector.kind))
        .bind(vector.dimension as i64)
        .bind(f32s_to_bytes(&vector.payload))
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        Ok(())
    }

    async fn get_vector(&self, id: VectorId) -> Result<Option<StoredVector>> {
        let row = sqlx::query_as::<_, VectorRow>(
            "SELECT id, site_id, snapshot_id, kind, payload FROM vectors WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        row.map(VectorRow::into_vector).transpose()
    }

    async fn vectors_for_snapshot(&self, snapshot_id: SnapshotId) -> Result<Vec<StoredVector>> {
        let rows = sqlx::query_as::<_, VectorRow>(
            "SELECT id, site_id, snapshot_id, kind, payload FROM vectors WHERE snapshot_id = ?",
        )
        .bind(snapshot_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        rows.into_iter().map(VectorRow::into_vector).collect()
    }

    async fn delete_vectors_for_snapshot(&self, snapshot_id: SnapshotId) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE snapshot_id = ?")
            .bind(snapshot_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(MonitorError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl WeightStore for SqliteStore {
    async fn get_weights(&self, site_id: SiteId) -> Result<Option<AdaptiveWeights>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT weights FROM site_weights WHERE site_id = ?")
                .bind(site_id.0.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(MonitorError::storage)?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(MonitorError::Json)).transpose()
    }

    async fn put_weights(&self, site_id: SiteId, weights: &AdaptiveWeights) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO site_weights (site_id, weights) VALUES (?, ?)",
        )
        .bind(site_id.0.to_string())
        .bind(serde_json::to_string(weights)?)
        .execute(&self.pool)
        .await
        .map_err(MonitorError::storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Schedule;

    #[test]
    fn f32_blob_round_trips() {
        let values = vec![0.5f32, -1.25, 3.75];
        assert_eq!(bytes_to_f32s(&f32s_to_bytes(&values)), values);
    }

    #[tokio::test]
    async fn site_round_trips() {
        let store = SqliteStore::in_memory().await.unwrap();
        let site = Site::new("https://a.example", "A", Schedule::parse("5m").unwrap())
            .with_keep_scans(10);
        store.put_site(&site).await.unwrap();

        let loaded = store.get_site(site.id).await.unwrap().unwrap();
        assert_eq!(loaded.url, site.url);
        assert_eq!(loaded.keep_scans, Some(10));
        assert_eq!(loaded.schedule.to_string(), "5m");
    }

    #[tokio::test]
    async fn snapshot_round_trips_with_verdict() {
        let store = SqliteStore::in_memory().await.unwrap();
        let site_id = SiteId::new();
        let mut snapshot = Snapshot::new(
            site_id,
            Utc::now(),
            200,
            80,
            "hello".into(),
            FingerprintSet {
                content_hash: "c".into(),
                structure_hash: "s".into(),
                text_block_hash: "t".into(),
                semantic_hash: "m".into(),
            },
        );
        snapshot.verdict = Some(Verdict::Benign);
        snapshot.confidence = Some(0.9);
        store.put_snapshot(&snapshot).await.unwrap();

        let baseline = store.baseline_snapshot(site_id).await.unwrap().unwrap();
        assert_eq!(baseline.id, snapshot.id);
        assert_eq!(baseline.verdict, Some(Verdict::Benign));
        assert_eq!(baseline.fingerprints, snapshot.fingerprints);
    }

    #[tokio::test]
    async fn vector_round_trips() {
        let store = SqliteStore::in_memory().await.unwrap();
        let vector =
            StoredVector::new(SiteId::new(), SnapshotId::new(), VectorKind::Main, vec![1.0, 2.0]);
        store.put_vector(&vector).await.unwrap();

        let loaded = store.get_vector(vector.id).await.unwrap().unwrap();
        assert_eq!(loaded.payload, vec![1.0, 2.0]);
        assert_eq!(loaded.kind, VectorKind::Main);
    }
}
