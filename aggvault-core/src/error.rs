//! Crate-level error taxonomy.
//!
//! Every failure is scoped to a single task: the scheduler captures the
//! error in the run report and moves on, so none of these variants ever
//! aborts sibling tasks. A missing upstream archive is deliberately *not*
//! represented here — it is a normal skip outcome, see
//! [`crate::fetch::FetchOutcome::NotFound`].

use chrono::NaiveDate;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Top-level error type returned by the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A symbol failed validation before any URL was built.
    #[error("invalid symbol {0:?}: expected non-empty ASCII alphanumerics")]
    InvalidSymbol(String),

    /// The requested date range is empty or reversed.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// A network fetch kept failing after the retry budget was spent.
    /// Timeouts, connection resets, and 5xx-class responses all land here.
    #[error("transient network error after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },

    /// The downloaded archive violates the single-entry ZIP contract or
    /// its compressed stream is corrupt. Never retried.
    #[error("archive format error: {0}")]
    ArchiveFormat(String),

    /// A CSV row failed field-count or type validation. The whole day is
    /// rejected rather than dropping the row.
    #[error("record format error at row {row}: {reason}")]
    RecordFormat { row: u64, reason: String },

    /// Filesystem write, rename, or read failure. A failed write never
    /// leaves a half-written partition behind.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The task's total wall-clock budget (including retries) ran out.
    #[error("task deadline exceeded")]
    DeadlineExceeded,

    /// The run was cancelled while this task was pending or in flight.
    #[error("run cancelled")]
    Cancelled,
}
