//! Bounded pool of browser sessions.
//!
//! Sessions live in a bounded channel of handles: acquisition is a channel
//! receive (FIFO among waiters on the receiver lock), release is a send.
//! Poisoned sessions are disposed and replaced on release, so the pool's
//! capacity is restored before the next acquirer proceeds.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::config::BrowserConfig;
use crate::error::{FetchError, FetchResult};
use crate::traits::{FetchOutcome, PageFetcher};

use super::session::BrowserSession;

pub struct BrowserPool {
    sender: mpsc::Sender<BrowserSession>,
    receiver: Mutex<mpsc::Receiver<BrowserSession>>,
    config: BrowserConfig,
}

impl BrowserPool {
    /// Launch `pool_size` sessions up front.
    pub async fn launch(config: BrowserConfig) -> FetchResult<Self> {
        let size = config.pool_size.max(1);
        let (sender, receiver) = mpsc::channel(size);

        for _ in 0..size {
            let session = BrowserSession::launch(&config).await?;
            sender
                .send(session)
                .await
                .map_err(|_| FetchError::Render {
                    url: String::new(),
                    reason: "pool channel closed during launch".to_string(),
                })?;
        }

        tracing::info!(pool_size = size, "browser pool ready");
        Ok(Self { sender, receiver: Mutex::new(receiver), config })
    }

    /// Take a session, waiting at most `deadline`.
    pub async fn acquire(&self, deadline: Duration) -> FetchResult<BrowserSession> {
        let started = std::time::Instant::now();
        let mut receiver = match tokio::time::timeout(deadline, self.receiver.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                return Err(FetchError::Timeout { url: "(pool acquire)".to_string() });
            }
        };

        let remaining = deadline.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, receiver.recv()).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(FetchError::Render {
                url: String::new(),
                reason: "browser pool closed".to_string(),
            }),
            Err(_) => Err(FetchError::Timeout { url: "(pool acquire)".to_string() }),
        }
    }

    /// Return a session. A poisoned session is disposed and replaced before
    /// the slot becomes visible again, keeping acquisition fairness intact.
    pub async fn release(&self, session: BrowserSession) {
        let session = if session.is_poisoned() {
            tracing::warn!("disposing poisoned browser session");
            session.close().await;
            match BrowserSession::launch(&self.config).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    tracing::error!(error = %e, "failed to revive browser session; pool shrinks");
                    return;
                }
            }
        } else {
            session
        };

        if self.sender.send(session).await.is_err() {
            tracing::debug!("browser pool closed; dropping released session");
        }
    }

    /// Close every session currently in the pool.
    pub async fn shutdown(&self) {
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        while let Some(session) = receiver.recv().await {
            session.close().await;
        }
        tracing::info!("browser pool shut down");
    }
}

#[async_trait]
impl PageFetcher for BrowserPool {
    async fn fetch(&self, url: &str, deadline: Duration) -> FetchResult<FetchOutcome> {
        let started = std::time::Instant::now();
        let mut session = self.acquire(deadline).await?;

        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            self.release(session).await;
            return Err(FetchError::Timeout { url: url.to_string() });
        }

        let result = session.fetch(url, remaining).await;
        self.release(session).await;
        result
    }
}
