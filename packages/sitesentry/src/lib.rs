//! # Sitesentry
//!
//! Website defacement monitoring engine: scheduled checks, rendered-page
//! capture, multi-dimensional change detection, and ensemble classification
//! of suspicious changes.
//!
//! ## Architecture
//!
//! ```text
//! FETCH → EXTRACT → DETECT ─┬→ (minor/unchanged) → PERSIST
//!            │              └→ (significant) → CLASSIFY → PERSIST → ALERT
//!            └→ VECTORIZE ──────────────────────┘
//!
//! Scheduler ──dispatch──► WorkflowEngine ──ports──► fetcher / embedder /
//!     ▲                                             llm / store / notifier
//!     └── control channel (register, pause, trigger, shutdown)
//! ```
//!
//! One check walks the DAG above. The scheduler owns all per-site state
//! (schedules, retries, circuit breakers, the in-flight set) behind a control
//! channel; the orchestrator glues scheduler, workflow engine and stores
//! together and exposes the operator surface.
//!
//! ## Ports
//!
//! External collaborators are consumed through narrow traits:
//!
//! - [`traits::PageFetcher`]: rendered page capture ([`browser::BrowserPool`]
//!   with chromium, [`browser::HttpFetcher`] for static sites)
//! - [`traits::Embedder`]: semantic embeddings
//! - [`traits::LlmClassifier`]: LLM adjudication of changes
//! - [`traits::AlertNotifier`]: fire-and-forget alert delivery
//! - [`traits::MonitorStore`]: persistence ([`stores::MemoryStore`], or
//!   `SqliteStore` behind the `sqlite` feature)
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sitesentry::{
//!     config::MonitorConfig, orchestrator::Orchestrator, stores::MemoryStore,
//!     scheduler::SystemClock, traits::NullNotifier, types::{Schedule, Site},
//!     workflow::WorkflowEngine,
//! };
//!
//! let config = MonitorConfig::from_env();
//! let store = Arc::new(MemoryStore::new());
//! let engine = Arc::new(WorkflowEngine::new(
//!     config.clone(), fetcher, embedder, llm, store.clone(),
//!     Arc::new(NullNotifier), Arc::new(SystemClock),
//! ));
//! let orchestrator = Orchestrator::new(config, store, engine);
//!
//! orchestrator.register_site(Site::new(
//!     "https://example.com", "Example", Schedule::parse("5m")?,
//! )).await?;
//! orchestrator.start().await?;
//! ```

pub mod browser;
pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod scheduler;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod vectorize;
pub mod workflow;

// Re-export the types most callers need at the crate root.
pub use config::MonitorConfig;
pub use error::{FetchError, LlmError, MonitorError, Result, ScheduleError};
pub use orchestrator::{Orchestrator, StatusReport};
pub use types::{
    Alert, AlertKind, AlertSeverity, ClassificationResult, Schedule, Site, SiteId, Snapshot,
    SnapshotId, Verdict,
};
