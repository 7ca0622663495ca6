//! Archive retrieval over HTTP with retry, backoff, and not-found detection.
//!
//! The [`ArchiveSource`] trait abstracts the remote repository so the
//! scheduler can be driven by a mock in tests. The real implementation is
//! [`HttpArchiveSource`]: a blocking reqwest client with a per-request
//! timeout and a jittered exponential backoff between attempts.
//!
//! Three outcomes are distinguished: `Found` (body retrieved), `NotFound`
//! (HTTP 404 — no trading that day, a normal skip, never retried), and a
//! transient failure (timeout, reset, non-2xx) which is retried up to the
//! configured budget and then surfaced for that task alone.

use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::locate;
use crate::task::Task;

/// What the remote repository had for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The archive body. Buffered whole: peak memory is one archive, never
    /// the batch.
    Found(Vec<u8>),
    /// The remote reports no archive for this (symbol, date).
    NotFound,
}

/// Source of archive bytes, mockable for tests.
pub trait ArchiveSource: Send + Sync {
    /// Fetch the archive for `task`, observing the cancellation token and
    /// the task's wall-clock deadline.
    fn fetch(&self, task: &Task, cancel: &CancelToken, deadline: Instant) -> Result<FetchOutcome>;
}

/// Jittered exponential backoff: `base * 2^(attempt-1)` capped at `cap`,
/// then scaled uniformly into `[delay/2, delay]` so concurrent workers
/// don't retry in lockstep.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base
        .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .min(cap);
    let millis = exp.as_millis() as u64;
    let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
    Duration::from_millis(jittered)
}

/// HTTP implementation of [`ArchiveSource`] against the public archive host.
pub struct HttpArchiveSource {
    client: reqwest::blocking::Client,
    base_url: String,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl HttpArchiveSource {
    pub fn new(config: &IngestConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: config.base_url.clone(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
        }
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn fetch(&self, task: &Task, cancel: &CancelToken, deadline: Instant) -> Result<FetchOutcome> {
        let url = locate::remote_url(&self.base_url, task);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            if attempt > 1 {
                let delay = backoff_delay(attempt - 1, self.backoff_base, self.backoff_cap);
                // Never sleep past the task deadline.
                if Instant::now() + delay >= deadline {
                    return Err(IngestError::DeadlineExceeded);
                }
                debug!(%url, attempt, ?delay, "retrying fetch");
                thread::sleep(delay);
                if cancel.is_cancelled() {
                    return Err(IngestError::Cancelled);
                }
            }

            if Instant::now() >= deadline {
                return Err(IngestError::DeadlineExceeded);
            }

            match self.client.get(&url).send() {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::NOT_FOUND {
                        debug!(%url, "archive absent upstream");
                        return Ok(FetchOutcome::NotFound);
                    }

                    if !status.is_success() {
                        warn!(%url, %status, attempt, "server returned error status");
                        last_error = format!("HTTP {status}");
                        continue;
                    }

                    match response.bytes() {
                        Ok(body) => {
                            debug!(%url, bytes = body.len(), "fetched archive");
                            return Ok(FetchOutcome::Found(body.to_vec()));
                        }
                        Err(e) => {
                            warn!(%url, error = %e, attempt, "body transfer failed");
                            last_error = format!("body transfer failed: {e}");
                            continue;
                        }
                    }
                }
                Err(e) => {
                    warn!(%url, error = %e, attempt, "request failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(IngestError::Transient {
            attempts: self.max_attempts,
            reason: last_error,
        })
    }
}
