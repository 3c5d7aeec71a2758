//! A single headless-browser session.
//!
//! Each session owns one chromium instance plus its CDP event handler task.
//! Operations on a session are strictly sequential; concurrency comes from
//! the pool holding several sessions.

use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;

use crate::config::BrowserConfig;
use crate::error::{FetchError, FetchResult};
use crate::traits::{FetchOutcome, RenderTimings};

use super::stealth::{blocked_url_patterns, STEALTH_PRELUDE};

pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    config: BrowserConfig,
    poisoned: bool,
}

impl BrowserSession {
    /// Launch a fresh chromium instance.
    pub async fn launch(config: &BrowserConfig) -> FetchResult<Self> {
        let chrome_config = ChromeConfig::builder()
            .args(vec![
                "--disable-blink-features=AutomationControlled",
                "--no-first-run",
                "--disable-background-networking",
            ])
            .build()
            .map_err(|reason| FetchError::Render { url: String::new(), reason })?;

        let (browser, mut handler) = Browser::launch(chrome_config).await.map_err(|e| {
            FetchError::Render { url: String::new(), reason: format!("browser launch: {e}") }
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler event error");
                }
            }
        });

        Ok(Self { browser, handler_task, config: config.clone(), poisoned: false })
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Navigate and capture the rendered page.
    pub async fn fetch(&mut self, url: &str, deadline: Duration) -> FetchResult<FetchOutcome> {
        let started = Instant::now();
        let result = tokio::time::timeout(deadline, self.fetch_inner(url, started)).await;

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(FetchError::Timeout { url: url.to_string() }),
        }
    }

    async fn fetch_inner(&mut self, url: &str, started: Instant) -> FetchResult<FetchOutcome> {
        let page = self.browser.new_page("about:blank").await.map_err(|e| {
            self.poisoned = true;
            FetchError::Render { url: url.to_string(), reason: format!("new page: {e}") }
        })?;

        // Hardening before any site script runs.
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_PRELUDE))
            .await
            .map_err(|e| FetchError::Render {
                url: url.to_string(),
                reason: format!("stealth prelude: {e}"),
            })?;

        let chosen_user_agent =
            self.config.user_agents.choose(&mut rand::thread_rng()).cloned();
        if let Some(user_agent) = chosen_user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent))
                .await
                .map_err(|e| FetchError::Render {
                    url: url.to_string(),
                    reason: format!("user agent: {e}"),
                })?;
        }

        let blocked = blocked_url_patterns(&self.config.blocked_resources);
        if !blocked.is_empty() {
            page.execute(SetBlockedUrLsParams::new(blocked)).await.map_err(|e| {
                FetchError::Render { url: url.to_string(), reason: format!("block list: {e}") }
            })?;
        }

        page.goto(url)
            .await
            .map_err(|e| classify_navigation_error(url, &e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| classify_navigation_error(url, &e.to_string()))?;
        let navigation_ms = started.elapsed().as_millis() as u64;

        // The CDP response event carries the status, but the navigation entry
        // is available without extra plumbing.
        let http_status: u16 = page
            .evaluate("performance.getEntriesByType('navigation')[0]?.responseStatus ?? 200")
            .await
            .ok()
            .and_then(|value| value.into_value::<u16>().ok())
            .map(|status| if status == 0 { 200 } else { status })
            .unwrap_or(200);

        if http_status >= 400 {
            let _ = page.close().await;
            return Err(FetchError::Http { url: url.to_string(), status: http_status });
        }

        let raw_html = page.content().await.map_err(|e| {
            self.poisoned = true;
            FetchError::Render { url: url.to_string(), reason: format!("content: {e}") }
        })?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        let _ = page.close().await;

        let elapsed = started.elapsed();
        Ok(FetchOutcome {
            raw_html,
            http_status,
            final_url,
            elapsed,
            render_timings: RenderTimings {
                navigation_ms,
                content_ms: elapsed.as_millis() as u64,
            },
        })
    }

    /// Dispose of the underlying browser.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "browser close failed");
        }
        self.handler_task.abort();
    }
}

/// Map chromium's navigation error strings onto typed fetch failures.
pub(crate) fn classify_navigation_error(url: &str, message: &str) -> FetchError {
    let lower = message.to_lowercase();
    if lower.contains("err_name_not_resolved") || lower.contains("dns") {
        FetchError::Dns { url: url.to_string() }
    } else if lower.contains("err_cert") || lower.contains("ssl") || lower.contains("tls") {
        FetchError::Tls { url: url.to_string() }
    } else if lower.contains("err_connection") || lower.contains("refused") || lower.contains("reset")
    {
        FetchError::Connect { url: url.to_string(), reason: message.to_string() }
    } else if lower.contains("timeout") || lower.contains("timed out") {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Render { url: url.to_string(), reason: message.to_string() }
    }
}
