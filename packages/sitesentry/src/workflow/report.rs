//! Check execution contracts between the scheduler and the workflow engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::detect::ChangeClassification;
use crate::error::Result;
use crate::types::{Site, SiteId, SnapshotId, Verdict};

/// Everything the workflow needs to run one check.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub site: Site,
    pub execution_id: Uuid,
    /// Consecutive transient fetch failures before this attempt; drives
    /// site-down alerting
    pub consecutive_failures: u32,
    /// Cancelled on pause/stop; the workflow aborts cooperatively
    pub cancel: CancellationToken,
}

impl CheckContext {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            execution_id: Uuid::now_v7(),
            consecutive_failures: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_consecutive_failures(mut self, failures: u32) -> Self {
        self.consecutive_failures = failures;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Outcome of a completed check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub execution_id: Uuid,
    pub site_id: SiteId,
    pub snapshot_id: Option<SnapshotId>,
    pub change: Option<ChangeClassification>,
    pub verdict: Option<Verdict>,
    pub confidence: Option<f64>,
    pub alerted: bool,
    pub elapsed_ms: u64,
}

/// Executes checks on behalf of the scheduler. The workflow engine is the
/// production implementation; tests substitute their own.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn run_check(&self, ctx: CheckContext) -> Result<CheckReport>;
}
