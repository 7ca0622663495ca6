//! Per-task outcomes, the consolidated run report, and progress callbacks.

use crate::error::{IngestError, Result};
use crate::task::Task;

/// Terminal success-side state of one task. Failures travel as
/// [`IngestError`] so the cause is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Partition fetched, parsed, and committed.
    Committed { rows: usize },
    /// Partition was already committed and the policy said to keep it.
    SkippedExists,
    /// No archive upstream for this (symbol, date) — a normal outcome, not
    /// an error.
    SkippedNotFound,
}

/// One failed task with its cause, for display and targeted re-runs.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: Task,
    pub cause: IngestError,
}

/// Consolidated outcome of a batch. Produced once per invocation; the
/// counts always sum to `total` once the run has drained.
#[derive(Debug, Default)]
pub struct RunReport {
    pub total: usize,
    pub committed: usize,
    pub skipped_exists: usize,
    pub skipped_not_found: usize,
    pub failures: Vec<TaskFailure>,
}

impl RunReport {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, task: Task, result: Result<TaskOutcome>) {
        match result {
            Ok(TaskOutcome::Committed { .. }) => self.committed += 1,
            Ok(TaskOutcome::SkippedExists) => self.skipped_exists += 1,
            Ok(TaskOutcome::SkippedNotFound) => self.skipped_not_found += 1,
            Err(cause) => self.failures.push(TaskFailure { task, cause }),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Progress callbacks for a batch run. Implementations must be thread-safe:
/// `on_start` fires from worker threads, the rest from the collecting thread.
pub trait IngestProgress: Send + Sync {
    /// A worker picked the task up.
    fn on_start(&self, task: &Task);

    /// The task reached a terminal state. `completed` counts tasks finished
    /// so far, in completion order.
    fn on_complete(
        &self,
        task: &Task,
        result: &Result<TaskOutcome>,
        completed: usize,
        total: usize,
    );

    /// The whole batch has drained.
    fn on_batch_complete(&self, report: &RunReport);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl IngestProgress for StdoutProgress {
    fn on_start(&self, task: &Task) {
        println!("Fetching {task}...");
    }

    fn on_complete(
        &self,
        task: &Task,
        result: &Result<TaskOutcome>,
        completed: usize,
        total: usize,
    ) {
        match result {
            Ok(TaskOutcome::Committed { rows }) => {
                println!("[{completed}/{total}] OK   {task} ({rows} rows)")
            }
            Ok(TaskOutcome::SkippedExists) => {
                println!("[{completed}/{total}] SKIP {task} (already committed)")
            }
            Ok(TaskOutcome::SkippedNotFound) => {
                println!("[{completed}/{total}] SKIP {task} (no upstream archive)")
            }
            Err(cause) => println!("[{completed}/{total}] FAIL {task}: {cause}"),
        }
    }

    fn on_batch_complete(&self, report: &RunReport) {
        println!(
            "\nIngestion complete: {} committed, {} already present, {} absent upstream, {} failed ({} total)",
            report.committed,
            report.skipped_exists,
            report.skipped_not_found,
            report.failed(),
            report.total,
        );
    }
}

/// No-op progress, for embedding and tests.
pub struct SilentProgress;

impl IngestProgress for SilentProgress {
    fn on_start(&self, _task: &Task) {}
    fn on_complete(&self, _: &Task, _: &Result<TaskOutcome>, _: usize, _: usize) {}
    fn on_batch_complete(&self, _report: &RunReport) {}
}
