//! Plain HTTP fetcher.
//!
//! Fallback [`PageFetcher`] for static sites and environments without a
//! chromium binary. No JavaScript rendering; client-side-rendered sites need
//! the browser pool.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::config::BrowserConfig;
use crate::error::{FetchError, FetchResult};
use crate::traits::{FetchOutcome, PageFetcher, RenderTimings};

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    pub fn new(config: &BrowserConfig) -> FetchResult<Self> {
        // Browser-like headers to avoid trivial bot rejection.
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .map_err(|_| invalid_header())?,
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().map_err(|_| invalid_header())?,
        );
        headers.insert(
            reqwest::header::UPGRADE_INSECURE_REQUESTS,
            "1".parse().map_err(|_| invalid_header())?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.navigation_timeout_seconds))
            .build()
            .map_err(|e| FetchError::Render { url: String::new(), reason: e.to_string() })?;

        Ok(Self { client, user_agents: config.user_agents.clone() })
    }

    fn classify(url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout { url: url.to_string() };
        }
        if err.is_connect() {
            let message = err.to_string().to_lowercase();
            if message.contains("dns") || message.contains("resolve") {
                return FetchError::Dns { url: url.to_string() };
            }
            if message.contains("certificate") || message.contains("tls") || message.contains("ssl")
            {
                return FetchError::Tls { url: url.to_string() };
            }
            return FetchError::Connect { url: url.to_string(), reason: err.to_string() };
        }
        FetchError::Connect { url: url.to_string(), reason: err.to_string() }
    }
}

fn invalid_header() -> FetchError {
    FetchError::Render { url: String::new(), reason: "invalid default header".to_string() }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: Duration) -> FetchResult<FetchOutcome> {
        let started = Instant::now();

        let user_agent = self
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "Mozilla/5.0".to_string());

        let request = self.client.get(url).header(reqwest::header::USER_AGENT, user_agent);

        let response = tokio::time::timeout(deadline, request.send())
            .await
            .map_err(|_| FetchError::Timeout { url: url.to_string() })?
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let navigation_ms = started.elapsed().as_millis() as u64;

        if status >= 400 {
            return Err(FetchError::Http { url: url.to_string(), status });
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        let raw_html = tokio::time::timeout(remaining, response.text())
            .await
            .map_err(|_| FetchError::Timeout { url: url.to_string() })?
            .map_err(|e| Self::classify(url, e))?;

        let elapsed = started.elapsed();
        Ok(FetchOutcome {
            raw_html,
            http_status: status,
            final_url,
            elapsed,
            render_timings: RenderTimings {
                navigation_ms,
                content_ms: elapsed.as_millis() as u64,
            },
        })
    }
}
