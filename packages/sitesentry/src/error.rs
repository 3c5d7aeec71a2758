//! Typed errors for the monitoring engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match on
//! failure domains: fetching, extraction, scheduling, classification, storage.

use thiserror::Error;

/// Errors that can occur anywhere in the monitoring engine.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Page fetch failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Content extraction failed
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// Schedule expression rejected
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// LLM classification failed
    #[error("LLM classifier error: {0}")]
    Llm(#[from] LlmError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Site not registered
    #[error("site not found: {site_id}")]
    SiteNotFound { site_id: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Workflow exceeded its total deadline
    #[error("check deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    /// Browser pool exhausted or shut down
    #[error("browser pool unavailable: {0}")]
    PoolUnavailable(String),

    /// A core invariant was violated; the process must not silently continue
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration value rejected
    #[error("config error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonitorError {
    /// Storage error from any boxable source.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Typed navigation/fetch failures.
///
/// The scheduler's retry and circuit-breaker logic keys off
/// [`FetchError::is_transient`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS resolution failed
    #[error("DNS resolution failed for {url}")]
    Dns { url: String },

    /// TLS handshake failed
    #[error("TLS handshake failed for {url}")]
    Tls { url: String },

    /// TCP connect failed or connection reset
    #[error("connection failed for {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Navigation or response exceeded the fetch timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Server answered with an error status
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Page loaded but rendering failed
    #[error("render failure for {url}: {reason}")]
    Render { url: String, reason: String },

    /// URL could not be parsed
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Transient failures are retried and count toward the circuit breaker.
    /// HTTP 408/429 are treated as transient; other 4xx are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Dns { .. }
            | FetchError::Tls { .. }
            | FetchError::Connect { .. }
            | FetchError::Timeout { .. }
            | FetchError::Render { .. } => true,
            FetchError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::InvalidUrl { .. } => false,
        }
    }

    /// Permanent HTTP failures (4xx except 408/429) mark the site degraded
    /// after repeated occurrences instead of being retried.
    pub fn is_permanent_http(&self) -> bool {
        matches!(self, FetchError::Http { status, .. }
            if (400..500).contains(status) && *status != 408 && *status != 429)
    }
}

/// Extraction failures. Malformed HTML is recovered best-effort and is never
/// an error; only a document with no usable content aborts the check.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document produced no extractable content")]
    EmptyDocument,
}

/// Schedule expressions are validated at registration; a bad expression
/// never creates a job.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Interval string did not match `<n><s|m|h|d>`
    #[error("invalid interval expression: {input}")]
    InvalidInterval { input: String },

    /// Cron expression rejected by the parser
    #[error("invalid cron expression {input:?}: {reason}")]
    InvalidCron { input: String, reason: String },

    /// Schedule produces no future fire time
    #[error("schedule {input:?} never fires")]
    NeverFires { input: String },
}

/// LLM classifier failures. Any of these cause the LLM vote to abstain
/// rather than failing the check.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("LLM reply could not be parsed: {reason}")]
    MalformedReply { reason: String },

    #[error("LLM upstream rate limit")]
    RateLimited,

    #[error("LLM upstream error: {0}")]
    Upstream(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for LLM operations.
pub type LlmResult<T> = std::result::Result<T, LlmError>;
