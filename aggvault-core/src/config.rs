//! Runtime knobs for an ingestion run.

use std::time::Duration;

/// Default remote archive host.
pub const DEFAULT_BASE_URL: &str = "https://data.binance.vision";

/// Configuration for the scheduler and the HTTP fetcher.
///
/// The defaults are tuned for the public archive host: a small worker pool
/// so the remote server is not hammered, three fetch attempts with jittered
/// exponential backoff, and a generous per-task wall-clock ceiling.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Number of worker threads draining the task queue.
    pub workers: usize,
    /// Total fetch attempts per task (first try included).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay.
    pub backoff_cap: Duration,
    /// Timeout applied to each individual HTTP request.
    pub request_timeout: Duration,
    /// Wall-clock ceiling for one task including all retries. A task that
    /// exceeds it is marked failed instead of blocking the pool.
    pub task_deadline: Duration,
    /// Remote archive host, overridable for tests and mirrors.
    pub base_url: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
            request_timeout: Duration::from_secs(30),
            task_deadline: Duration::from_secs(300),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}
