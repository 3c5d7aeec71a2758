//! Job scheduler.
//!
//! A single task owns the schedule map, the per-site circuit breakers and the
//! in-flight set; everything else talks to it over the control channel, so no
//! lock-per-site exists anywhere. Concurrency is bounded by a semaphore
//! (`max_concurrent_jobs`); per-site concurrency is bounded to one by the
//! in-flight set (a job firing while its predecessor still runs is skipped).

pub mod clock;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::{BreakerState, CircuitBreaker, RetryPolicy};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::traits::{JobStore, MonitorStore};
use crate::types::{Job, JobStatus, Site, SiteId};
use crate::workflow::{CheckContext, CheckReport, CheckRunner};

/// Operator-facing scheduler state summary.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub total_jobs: usize,
    pub running: usize,
    pub paused: usize,
    pub circuit_open: usize,
    pub jobs: Vec<Job>,
}

/// Commands accepted on the control channel.
pub enum SchedulerCommand {
    Register(Box<Site>),
    Update(Box<Site>),
    Unregister(SiteId),
    Pause(SiteId),
    Resume(SiteId),
    PauseAll,
    ResumeAll,
    TriggerImmediate { site_id: SiteId, reply: oneshot::Sender<Result<Uuid>> },
    Status { reply: oneshot::Sender<SchedulerStatus> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Completion message sent back by a finished check task.
struct CheckCompletion {
    site_id: SiteId,
    result: Result<CheckReport>,
}

/// Cloneable handle for submitting commands.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub async fn register(&self, site: Site) -> Result<()> {
        self.send(SchedulerCommand::Register(Box::new(site))).await
    }

    pub async fn update(&self, site: Site) -> Result<()> {
        self.send(SchedulerCommand::Update(Box::new(site))).await
    }

    pub async fn unregister(&self, site_id: SiteId) -> Result<()> {
        self.send(SchedulerCommand::Unregister(site_id)).await
    }

    pub async fn pause(&self, site_id: SiteId) -> Result<()> {
        self.send(SchedulerCommand::Pause(site_id)).await
    }

    pub async fn resume(&self, site_id: SiteId) -> Result<()> {
        self.send(SchedulerCommand::Resume(site_id)).await
    }

    pub async fn pause_all(&self) -> Result<()> {
        self.send(SchedulerCommand::PauseAll).await
    }

    pub async fn resume_all(&self) -> Result<()> {
        self.send(SchedulerCommand::ResumeAll).await
    }

    pub async fn trigger_immediate(&self, site_id: SiteId) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::TriggerImmediate { site_id, reply }).await?;
        rx.await.map_err(|_| MonitorError::Cancelled)?
    }

    pub async fn status(&self) -> Result<SchedulerStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::Status { reply }).await?;
        rx.await.map_err(|_| MonitorError::Cancelled)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| MonitorError::Cancelled)
    }

    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MonitorError::InvariantViolation("scheduler task is gone".to_string()))
    }
}

struct SiteEntry {
    site: Site,
    job: Job,
    breaker: CircuitBreaker,
    /// Execution id promised to a pending immediate trigger
    pending_immediate: Option<Uuid>,
}

pub struct Scheduler {
    config: MonitorConfig,
    runner: Arc<dyn CheckRunner>,
    store: Arc<dyn MonitorStore>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,

    commands: mpsc::Receiver<SchedulerCommand>,
    completions_tx: mpsc::Sender<CheckCompletion>,
    completions_rx: mpsc::Receiver<CheckCompletion>,

    entries: HashMap<SiteId, SiteEntry>,
    in_flight: HashSet<SiteId>,
    /// Due jobs awaiting a concurrency permit, FIFO
    ready_queue: VecDeque<SiteId>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        config: MonitorConfig,
        runner: Arc<dyn CheckRunner>,
        store: Arc<dyn MonitorStore>,
        clock: Arc<dyn Clock>,
    ) -> (Self, SchedulerHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (completions_tx, completions_rx) = mpsc::channel(64);
        let semaphore = Arc::new(Semaphore::new(config.scheduler.max_concurrent_jobs));
        let retry_policy = RetryPolicy::new(config.retry);

        let scheduler = Self {
            config,
            runner,
            store,
            clock,
            retry_policy,
            commands: commands_rx,
            completions_tx,
            completions_rx,
            entries: HashMap::new(),
            in_flight: HashSet::new(),
            ready_queue: VecDeque::new(),
            semaphore,
            cancel: CancellationToken::new(),
        };

        (scheduler, SchedulerHandle { commands: commands_tx })
    }

    /// Run until shutdown. Consumes the scheduler; spawn it as a task.
    pub async fn run(mut self) {
        info!(
            max_concurrent = self.config.scheduler.max_concurrent_jobs,
            misfire_grace_s = self.config.scheduler.misfire_grace_seconds,
            "scheduler starting"
        );

        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            self.config.scheduler.poll_interval_ms,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown_reply = loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(SchedulerCommand::Shutdown { reply }) => break Some(reply),
                        Some(command) => self.handle_command(command).await,
                        None => break None,
                    }
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion).await;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        };

        self.drain().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        info!("scheduler stopped");
    }

    /// Wait for in-flight checks up to the drain deadline, then cancel.
    async fn drain(&mut self) {
        let deadline = self.config.drain_timeout();
        info!(in_flight = self.in_flight.len(), drain_timeout_s = deadline.as_secs(), "draining");

        let drained = tokio::time::timeout(deadline, async {
            while !self.in_flight.is_empty() {
                match self.completions_rx.recv().await {
                    Some(completion) => self.handle_completion(completion).await,
                    None => break,
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = self.in_flight.len(), "drain deadline hit; cancelling workflows");
            self.cancel.cancel();
        }
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        let now = self.clock.now();
        match command {
            SchedulerCommand::Register(site) => self.register(*site, now).await,
            SchedulerCommand::Update(site) => {
                let site = *site;
                match self.entries.get_mut(&site.id) {
                    Some(entry) => {
                        // Schedule changes take effect at the next fire.
                        entry.job.next_run_at = site.schedule.next_fire(now);
                        entry.job.priority = site.priority;
                        entry.site = site;
                        entry.job.updated_at = now;
                        let job = entry.job.clone();
                        self.persist_job(job).await;
                    }
                    None => self.register(site, now).await,
                }
            }
            SchedulerCommand::Unregister(site_id) => {
                if let Some(mut entry) = self.entries.remove(&site_id) {
                    entry.job.status = JobStatus::Removed;
                    entry.job.updated_at = now;
                    self.persist_job(entry.job).await;
                    if let Err(e) = self.store.delete_job(site_id).await {
                        warn!(site_id = %site_id, error = %e, "failed to delete job record");
                    }
                }
                self.ready_queue.retain(|id| *id != site_id);
            }
            SchedulerCommand::Pause(site_id) => {
                if let Some(entry) = self.entries.get_mut(&site_id) {
                    if entry.job.status == JobStatus::Scheduled {
                        entry.job.status = JobStatus::Paused;
                        entry.job.updated_at = now;
                        self.ready_queue.retain(|id| *id != site_id);
                        let job = entry.job.clone();
                        self.persist_job(job).await;
                    }
                }
            }
            SchedulerCommand::Resume(site_id) => {
                if let Some(entry) = self.entries.get_mut(&site_id) {
                    if matches!(entry.job.status, JobStatus::Paused | JobStatus::CircuitOpen) {
                        entry.job.status = JobStatus::Scheduled;
                        entry.breaker.record_success();
                        entry.job.next_run_at = Some(now);
                        entry.job.updated_at = now;
                        let job = entry.job.clone();
                        self.persist_job(job).await;
                    }
                }
            }
            SchedulerCommand::PauseAll => {
                info!("pausing all jobs");
                for entry in self.entries.values_mut() {
                    if entry.job.status == JobStatus::Scheduled {
                        entry.job.status = JobStatus::Paused;
                        entry.job.updated_at = now;
                    }
                }
                self.ready_queue.clear();
            }
            SchedulerCommand::ResumeAll => {
                info!("resuming all jobs");
                for entry in self.entries.values_mut() {
                    if entry.job.status == JobStatus::Paused {
                        entry.job.status = JobStatus::Scheduled;
                        entry.job.next_run_at =
                            entry.job.next_run_at.filter(|at| *at > now).or(Some(now));
                        entry.job.updated_at = now;
                    }
                }
            }
            SchedulerCommand::TriggerImmediate { site_id, reply } => {
                let result = match self.entries.get_mut(&site_id) {
                    Some(entry) => {
                        let execution_id = Uuid::now_v7();
                        entry.pending_immediate = Some(execution_id);
                        if entry.job.status == JobStatus::Paused
                            || entry.job.status == JobStatus::CircuitOpen
                        {
                            entry.job.status = JobStatus::Scheduled;
                            entry.breaker.record_success();
                        }
                        entry.job.next_run_at = Some(now);
                        Ok(execution_id)
                    }
                    None => Err(MonitorError::SiteNotFound { site_id: site_id.to_string() }),
                };
                let _ = reply.send(result);
            }
            SchedulerCommand::Status { reply } => {
                let jobs: Vec<Job> = self.entries.values().map(|e| e.job.clone()).collect();
                let status = SchedulerStatus {
                    total_jobs: jobs.len(),
                    running: jobs.iter().filter(|j| j.status == JobStatus::Running).count(),
                    paused: jobs.iter().filter(|j| j.status == JobStatus::Paused).count(),
                    circuit_open: jobs
                        .iter()
                        .filter(|j| j.status == JobStatus::CircuitOpen)
                        .count(),
                    jobs,
                };
                let _ = reply.send(status);
            }
            SchedulerCommand::Shutdown { .. } => unreachable!("handled by the run loop"),
        }
    }

    async fn register(&mut self, site: Site, now: DateTime<Utc>) {
        let mut job = Job::new(site.id, site.priority, self.retry_policy.max_attempts(), now);
        // First check runs immediately to establish the baseline.
        job.next_run_at = Some(now);
        if !site.active {
            job.status = JobStatus::Paused;
        }

        info!(site_id = %site.id, url = %site.url, schedule = %site.schedule, "site registered");
        self.persist_job(job.clone()).await;
        self.entries.insert(
            site.id,
            SiteEntry {
                site,
                job,
                breaker: CircuitBreaker::new(self.config.breaker),
                pending_immediate: None,
            },
        );
    }

    /// One scheduling pass: collect due jobs, apply misfire grace, dispatch
    /// while permits remain.
    async fn tick(&mut self) {
        let now = self.clock.now();
        let grace = chrono::Duration::seconds(self.config.scheduler.misfire_grace_seconds as i64);

        let mut due: Vec<(DateTime<Utc>, SiteId)> = Vec::new();
        for (site_id, entry) in self.entries.iter_mut() {
            // Circuit-open jobs become eligible again when the breaker hands
            // out its probe.
            if entry.job.status == JobStatus::CircuitOpen {
                if entry.breaker.try_acquire(now) {
                    debug!(site_id = %site_id, "circuit breaker probe");
                    entry.job.status = JobStatus::Scheduled;
                    entry.job.next_run_at = Some(now);
                } else {
                    continue;
                }
            }

            if !entry.job.is_due(now) || self.in_flight.contains(site_id) {
                continue;
            }

            let fire_at = match entry.job.next_run_at {
                Some(at) => at,
                None => continue,
            };

            // Old misfires are dropped to the next fire time.
            if now - fire_at > grace {
                let next = entry.site.schedule.next_fire(now);
                debug!(site_id = %site_id, missed = %fire_at, next = ?next, "misfire dropped");
                entry.job.next_run_at = next;
                continue;
            }

            if !self.ready_queue.contains(site_id) {
                due.push((fire_at, *site_id));
            }
        }

        // FIFO by fire time, then priority.
        due.sort_by_key(|(fire_at, site_id)| {
            let priority = self.entries.get(site_id).map(|e| e.job.priority).unwrap_or_default();
            (*fire_at, priority)
        });
        self.ready_queue.extend(due.into_iter().map(|(_, site_id)| site_id));

        while let Some(site_id) = self.ready_queue.front().copied() {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            self.ready_queue.pop_front();
            self.dispatch(site_id, permit, now).await;
        }
    }

    async fn dispatch(
        &mut self,
        site_id: SiteId,
        permit: tokio::sync::OwnedSemaphorePermit,
        now: DateTime<Utc>,
    ) {
        let Some(entry) = self.entries.get_mut(&site_id) else {
            drop(permit);
            return;
        };

        // Coalesce: at most one in-flight workflow per site.
        if !self.in_flight.insert(site_id) {
            drop(permit);
            return;
        }

        entry.job.status = JobStatus::Running;
        entry.job.last_run_at = Some(now);
        entry.job.updated_at = now;

        let execution_id = entry.pending_immediate.take().unwrap_or_else(Uuid::now_v7);
        let ctx = CheckContext {
            site: entry.site.clone(),
            execution_id,
            consecutive_failures: entry.job.consecutive_failures,
            cancel: self.cancel.child_token(),
        };

        debug!(site_id = %site_id, execution_id = %execution_id, "dispatching check");
        let job = entry.job.clone();
        self.persist_job(job).await;

        let runner = self.runner.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = runner.run_check(ctx).await;
            let _ = completions.send(CheckCompletion { site_id, result }).await;
            drop(permit);
        });
    }

    async fn handle_completion(&mut self, completion: CheckCompletion) {
        let now = self.clock.now();
        let site_id = completion.site_id;
        self.in_flight.remove(&site_id);

        let Some(entry) = self.entries.get_mut(&site_id) else { return };
        let job = &mut entry.job;
        job.updated_at = now;

        match completion.result {
            Ok(report) => {
                debug!(site_id = %site_id, execution_id = %report.execution_id, "check succeeded");
                job.status = JobStatus::Scheduled;
                job.retry_count = 0;
                job.consecutive_failures = 0;
                job.consecutive_permanent = 0;
                job.last_success_at = Some(now);
                job.next_run_at = entry.site.schedule.next_fire(now);
                entry.breaker.record_success();
            }
            Err(MonitorError::Cancelled) => {
                debug!(site_id = %site_id, "check cancelled");
                job.status =
                    if job.status == JobStatus::Paused { JobStatus::Paused } else { JobStatus::Scheduled };
                job.next_run_at = entry.site.schedule.next_fire(now);
            }
            Err(MonitorError::Fetch(fetch_err)) if fetch_err.is_permanent_http() => {
                warn!(site_id = %site_id, error = %fetch_err, "permanent fetch failure");
                job.consecutive_permanent += 1;
                job.status = JobStatus::Scheduled;
                job.next_run_at = entry.site.schedule.next_fire(now);
                if job.is_degraded(self.config.storage.degraded_threshold) {
                    warn!(
                        site_id = %site_id,
                        consecutive = job.consecutive_permanent,
                        "site marked degraded"
                    );
                }
            }
            Err(err) => {
                let counts_toward_breaker = matches!(&err, MonitorError::Fetch(_));
                warn!(site_id = %site_id, error = %err, "check failed");

                job.consecutive_failures += 1;
                if counts_toward_breaker {
                    entry.breaker.record_failure(now);
                }

                if entry.breaker.state() == BreakerState::Open {
                    info!(
                        site_id = %site_id,
                        failures = entry.breaker.consecutive_failures(),
                        "circuit opened"
                    );
                    job.status = JobStatus::CircuitOpen;
                    job.retry_count = 0;
                } else if job.retry_count + 1 < job.max_retries {
                    job.retry_count += 1;
                    let backoff = self.retry_policy.delay_for(job.retry_count);
                    job.status = JobStatus::Scheduled;
                    job.next_run_at = Some(
                        now + chrono::Duration::milliseconds(backoff.as_millis() as i64),
                    );
                    debug!(
                        site_id = %site_id,
                        attempt = job.retry_count,
                        backoff_ms = backoff.as_millis() as u64,
                        "retry scheduled"
                    );
                } else {
                    // Retries exhausted for this cycle; fall back to the
                    // regular cadence.
                    warn!(site_id = %site_id, "retries exhausted; awaiting next fire");
                    job.retry_count = 0;
                    job.next_run_at = entry.site.schedule.next_fire(now);
                    job.status = JobStatus::Scheduled;
                }
            }
        }

        // An immediate check requested while the previous run was in flight
        // fires as soon as the slot frees up.
        if entry.pending_immediate.is_some() && job.status == JobStatus::Scheduled {
            job.next_run_at = Some(now);
        }

        let job = job.clone();
        self.persist_job(job).await;
    }

    async fn persist_job(&self, job: Job) {
        if let Err(e) = self.store.put_job(&job).await {
            error!(site_id = %job.site_id, error = %e, "failed to persist job state");
        }
    }
}
