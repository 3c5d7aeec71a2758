//! Lifecycle orchestration.
//!
//! Owns startup/shutdown ordering (stores are available first, then the
//! scheduler with the workflow engine as its check runner) and exposes the
//! operator surface: lifecycle, site CRUD, immediate checks, status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::scheduler::{Clock, Scheduler, SchedulerHandle, SystemClock};
use crate::traits::{MonitorStore, SiteStore};
use crate::types::{JobStatus, Site, SiteId};
use crate::workflow::CheckRunner;

/// Health of one engine component, surfaced through [`StatusReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub detail: String,
}

/// Operator-facing status summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    pub uptime_seconds: u64,
    pub active_jobs: usize,
    pub components: Vec<ComponentHealth>,
}

struct RunningScheduler {
    handle: SchedulerHandle,
    task: tokio::task::JoinHandle<()>,
    started_at: DateTime<Utc>,
}

pub struct Orchestrator {
    config: MonitorConfig,
    store: Arc<dyn MonitorStore>,
    runner: Arc<dyn CheckRunner>,
    clock: Arc<dyn Clock>,
    running: Mutex<Option<RunningScheduler>>,
}

impl Orchestrator {
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn MonitorStore>,
        runner: Arc<dyn CheckRunner>,
    ) -> Self {
        Self::with_clock(config, store, runner, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: MonitorConfig,
        store: Arc<dyn MonitorStore>,
        runner: Arc<dyn CheckRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { config, store, runner, clock, running: Mutex::new(None) }
    }

    /// Start monitoring: spawn the scheduler and register every active site
    /// already in the store.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(MonitorError::Config("orchestrator already started".to_string()));
        }

        let (scheduler, handle) = Scheduler::new(
            self.config.clone(),
            self.runner.clone(),
            self.store.clone(),
            self.clock.clone(),
        );
        let task = tokio::spawn(scheduler.run());

        let sites = self.store.list_sites().await?;
        let site_count = sites.len();
        for site in sites {
            if site.active {
                handle.register(site).await?;
            }
        }

        info!(sites = site_count, "monitoring started");
        *running = Some(RunningScheduler { handle, task, started_at: self.clock.now() });
        Ok(())
    }

    /// Stop monitoring, draining in-flight workflows within the configured
    /// deadline.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(state) = running.take() else {
            return Ok(());
        };

        state.handle.shutdown().await?;
        state
            .task
            .await
            .map_err(|e| MonitorError::InvariantViolation(format!("scheduler task panicked: {e}")))?;
        info!("monitoring stopped");
        Ok(())
    }

    pub async fn pause_all(&self) -> Result<()> {
        self.handle().await?.pause_all().await
    }

    pub async fn resume_all(&self) -> Result<()> {
        self.handle().await?.resume_all().await
    }

    /// Persist a new site and start scheduling it. The schedule was already
    /// validated when the [`Site`] was constructed; a bad expression never
    /// gets this far.
    pub async fn register_site(&self, site: Site) -> Result<()> {
        self.store.put_site(&site).await?;
        if let Ok(handle) = self.handle().await {
            if site.active {
                handle.register(site).await?;
            }
        }
        Ok(())
    }

    /// Remove a site. Snapshots, vectors, alerts and the job cascade via the
    /// store.
    pub async fn unregister_site(&self, site_id: SiteId) -> Result<()> {
        if let Ok(handle) = self.handle().await {
            handle.unregister(site_id).await?;
        }
        self.store.delete_site(site_id).await
    }

    pub async fn update_site(&self, site: Site) -> Result<()> {
        self.store.put_site(&site).await?;
        if let Ok(handle) = self.handle().await {
            handle.update(site).await?;
        }
        Ok(())
    }

    pub async fn pause_site(&self, site_id: SiteId) -> Result<()> {
        self.handle().await?.pause(site_id).await
    }

    pub async fn resume_site(&self, site_id: SiteId) -> Result<()> {
        self.handle().await?.resume(site_id).await
    }

    /// Run a check for the site now, ahead of its schedule.
    pub async fn trigger_immediate(&self, site_id: SiteId) -> Result<Uuid> {
        self.handle().await?.trigger_immediate(site_id).await
    }

    pub async fn status(&self) -> StatusReport {
        let running = self.running.lock().await;
        let Some(state) = running.as_ref() else {
            return StatusReport {
                running: false,
                uptime_seconds: 0,
                active_jobs: 0,
                components: vec![ComponentHealth {
                    name: "scheduler".to_string(),
                    healthy: false,
                    detail: "not started".to_string(),
                }],
            };
        };

        let uptime_seconds = (self.clock.now() - state.started_at).num_seconds().max(0) as u64;

        let mut components = Vec::new();
        let scheduler_status = state.handle.status().await;
        let active_jobs = match &scheduler_status {
            Ok(status) => {
                components.push(ComponentHealth {
                    name: "scheduler".to_string(),
                    healthy: true,
                    detail: format!(
                        "{} jobs ({} running, {} paused, {} circuit-open)",
                        status.total_jobs, status.running, status.paused, status.circuit_open
                    ),
                });
                status
                    .jobs
                    .iter()
                    .filter(|j| j.status != JobStatus::Removed && j.status != JobStatus::Paused)
                    .count()
            }
            Err(e) => {
                components.push(ComponentHealth {
                    name: "scheduler".to_string(),
                    healthy: false,
                    detail: e.to_string(),
                });
                0
            }
        };

        match self.store.list_sites().await {
            Ok(sites) => components.push(ComponentHealth {
                name: "store".to_string(),
                healthy: true,
                detail: format!("{} sites", sites.len()),
            }),
            Err(e) => components.push(ComponentHealth {
                name: "store".to_string(),
                healthy: false,
                detail: e.to_string(),
            }),
        }

        StatusReport {
            running: true,
            uptime_seconds,
            active_jobs,
            components,
        }
    }

    async fn handle(&self) -> Result<SchedulerHandle> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|state| state.handle.clone())
            .ok_or_else(|| MonitorError::Config("monitoring is not running".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::RecordingRunner;
    use crate::types::Schedule;

    fn orchestrator(runner: Arc<RecordingRunner>) -> Orchestrator {
        let mut config = MonitorConfig::default();
        config.scheduler.poll_interval_ms = 10;
        config.scheduler.drain_timeout_seconds = 2;
        Orchestrator::new(config, Arc::new(MemoryStore::new()), runner)
    }

    fn site() -> Site {
        Site::new("https://a.example", "A", Schedule::parse("1h").unwrap())
    }

    #[tokio::test]
    async fn start_registers_persisted_active_sites() {
        let runner = Arc::new(RecordingRunner::instant());
        let orch = orchestrator(runner.clone());

        orch.store.put_site(&site()).await.unwrap();
        let mut inactive = site();
        inactive.active = false;
        orch.store.put_site(&inactive).await.unwrap();

        orch.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(runner.started(), 1);
        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let orch = orchestrator(Arc::new(RecordingRunner::instant()));
        orch.start().await.unwrap();
        assert!(orch.start().await.is_err());
        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let orch = orchestrator(Arc::new(RecordingRunner::instant()));
        orch.start().await.unwrap();
        orch.stop().await.unwrap();
        orch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn status_reflects_lifecycle() {
        let orch = orchestrator(Arc::new(RecordingRunner::instant()));
        assert!(!orch.status().await.running);

        orch.start().await.unwrap();
        let status = orch.status().await;
        assert!(status.running);
        assert!(status.components.iter().all(|c| c.healthy));

        orch.stop().await.unwrap();
        assert!(!orch.status().await.running);
    }

    #[tokio::test]
    async fn register_site_while_running_schedules_it() {
        let runner = Arc::new(RecordingRunner::instant());
        let orch = orchestrator(runner.clone());
        orch.start().await.unwrap();

        orch.register_site(site()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(runner.started(), 1);

        orch.stop().await.unwrap();
    }
}
