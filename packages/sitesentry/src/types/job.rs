//! Job model for scheduled site checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::site::{CheckPriority, SiteId};

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Scheduled,
    Running,
    Paused,
    Failed,
    CircuitOpen,
    Removed,
}

/// Per-site scheduling state. Mutated only by the scheduler task; every
/// active site has exactly one non-removed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub site_id: SiteId,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: JobStatus,
    pub priority: CheckPriority,
    /// Transient fetch failures in a row; drives site-down alerting and the
    /// circuit breaker
    pub consecutive_failures: u32,
    /// Permanent 4xx responses in a row; drives the degraded marker
    pub consecutive_permanent: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(site_id: SiteId, priority: CheckPriority, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            site_id,
            next_run_at: None,
            last_run_at: None,
            last_success_at: None,
            retry_count: 0,
            max_retries,
            status: JobStatus::Scheduled,
            priority,
            consecutive_failures: 0,
            consecutive_permanent: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Ready to run: scheduled, with a due fire time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Scheduled {
            return false;
        }
        match self.next_run_at {
            Some(at) => at <= now,
            None => false,
        }
    }

    /// A site is considered degraded once permanent fetch failures persist.
    pub fn is_degraded(&self, threshold: u32) -> bool {
        self.consecutive_permanent >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_job_is_scheduled_with_zero_counters() {
        let job = Job::new(SiteId::new(), CheckPriority::Normal, 3, Utc::now());
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.consecutive_failures, 0);
    }

    #[test]
    fn job_without_fire_time_is_not_due() {
        let job = Job::new(SiteId::new(), CheckPriority::Normal, 3, Utc::now());
        assert!(!job.is_due(Utc::now()));
    }

    #[test]
    fn due_respects_fire_time() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut job = Job::new(SiteId::new(), CheckPriority::Normal, 3, now);
        job.next_run_at = Some(now + chrono::Duration::seconds(30));
        assert!(!job.is_due(now));
        assert!(job.is_due(now + chrono::Duration::seconds(30)));
    }

    #[test]
    fn paused_job_is_never_due() {
        let now = Utc::now();
        let mut job = Job::new(SiteId::new(), CheckPriority::Normal, 3, now);
        job.next_run_at = Some(now - chrono::Duration::seconds(5));
        job.status = JobStatus::Paused;
        assert!(!job.is_due(now));
    }
}
