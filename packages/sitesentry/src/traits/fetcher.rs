//! Page-fetching port.
//!
//! The engine renders pages through this trait; the browser pool and the
//! plain HTTP fetcher both implement it. Which one a deployment uses is
//! wiring, not engine logic.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchResult;

/// Render timings captured during navigation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RenderTimings {
    /// Time until navigation committed
    pub navigation_ms: u64,
    /// Time until content was considered settled
    pub content_ms: u64,
}

/// Result of fetching a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub raw_html: String,
    pub http_status: u16,
    /// URL after redirects
    pub final_url: String,
    pub elapsed: Duration,
    pub render_timings: RenderTimings,
}

/// Fetches rendered page state. Implementations must honor the deadline:
/// a fetch that cannot complete in time returns `FetchError::Timeout`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, deadline: Duration) -> FetchResult<FetchOutcome>;
}
