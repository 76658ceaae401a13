// src/ingest/fetch.rs
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, FetchError, Result};
use crate::ingest::window::TimeWindow;

/// One GET returning the full body, or a classified failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// reqwest-backed fetcher. Redirects are not followed; the timeout bounds the
/// whole exchange (connect + headers + body).
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(concat!("seismic-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("building HTTP client: {e}"), "request_timeout_ms"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let t0 = std::time::Instant::now();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(describe(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            // Dropping `resp` here closes the transfer without reading the body.
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(describe(&e)))?;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(body)
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

/// `GET {base}?starttime=...&endtime=...` with whole-second UTC timestamps.
pub fn catalog_url(base: &str, window: &TimeWindow) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{sep}starttime={}&endtime={}",
        window.start_iso(),
        window.end_iso()
    )
}

/// Spaces out request starts without blocking a thread. Zero interval disables it.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Reserve the next slot, then sleep until it (the lock is not held while sleeping).
    pub async fn wait_turn(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Paced fetch with exponential backoff on transient failures.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    pacer: &RequestPacer,
    url: &str,
    policy: RetryPolicy,
) -> std::result::Result<String, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        pacer.wait_turn().await;
        match fetcher.fetch(url).await {
            Ok(body) => return Ok(body),
            Err(e) => {
                counter!("ingest_fetch_errors_total").increment(1);
                if attempt > policy.max_retries || !e.is_retryable() {
                    return Err(e);
                }
                let delay = policy.delay(attempt);
                tracing::debug!(target: "ingest", %url, attempt, error = %e, ?delay, "retrying fetch");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
