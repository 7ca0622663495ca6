//! Batch scheduling: fan a request out across a bounded worker pool.
//!
//! The request expands to one task per (symbol, date). A fixed number of
//! worker threads drain a shared queue, each running the whole
//! fetch → decode/parse → write pipeline for one task at a time, so
//! parallelism is bounded regardless of batch size. Per-task results flow
//! back over an mpsc channel and are folded into the run report one at a
//! time — the channel serializes every report mutation.
//!
//! No task failure stops a sibling: the queue is always drained and the
//! report accounts for every task.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::IngestConfig;
use crate::decode;
use crate::error::{IngestError, Result};
use crate::fetch::{ArchiveSource, FetchOutcome};
use crate::report::{IngestProgress, RunReport, TaskOutcome};
use crate::store::{MetadataSink, OverwritePolicy, PartitionStore, WriteOutcome};
use crate::task::{IngestRequest, Task};

/// Run a full ingestion batch and return the consolidated report.
///
/// Only request expansion can fail here (invalid symbol or date range);
/// every per-task error ends up inside the report instead.
pub fn run_ingestion(
    request: &IngestRequest,
    source: &dyn ArchiveSource,
    store: &PartitionStore,
    metadata: &dyn MetadataSink,
    config: &IngestConfig,
    cancel: &CancelToken,
    progress: &dyn IngestProgress,
) -> Result<RunReport> {
    let tasks = request.expand()?;
    let total = tasks.len();
    let workers = config.workers.clamp(1, total.max(1));
    debug!(total, workers, "starting ingestion run");

    let queue = Mutex::new(VecDeque::from(tasks));
    let (tx, rx) = mpsc::channel::<(Task, Result<TaskOutcome>)>();

    let report = thread::scope(|scope| {
        let queue = &queue;
        for _ in 0..workers {
            let tx = tx.clone();
            scope.spawn(move || loop {
                let task = queue.lock().unwrap().pop_front();
                let Some(task) = task else { break };

                progress.on_start(&task);
                let result = if cancel.is_cancelled() {
                    Err(IngestError::Cancelled)
                } else {
                    run_task(&task, request.policy, source, store, metadata, config, cancel)
                };

                if tx.send((task, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut report = RunReport::new(total);
        let mut completed = 0;
        for (task, result) in rx {
            completed += 1;
            progress.on_complete(&task, &result, completed, total);
            report.record(task, result);
        }
        report
    });

    progress.on_batch_complete(&report);
    Ok(report)
}

/// One task through the whole pipeline. Stages run strictly in order; the
/// cancellation token and the wall-clock deadline are checked between them.
fn run_task(
    task: &Task,
    policy: OverwritePolicy,
    source: &dyn ArchiveSource,
    store: &PartitionStore,
    metadata: &dyn MetadataSink,
    config: &IngestConfig,
    cancel: &CancelToken,
) -> Result<TaskOutcome> {
    let key = task.key();

    // Known-committed partitions skip the download entirely.
    if policy == OverwritePolicy::SkipIfExists && store.is_committed(&key) {
        return Ok(TaskOutcome::SkippedExists);
    }

    let deadline = Instant::now() + config.task_deadline;

    debug!(%task, "fetching");
    let body = match source.fetch(task, cancel, deadline)? {
        FetchOutcome::NotFound => return Ok(TaskOutcome::SkippedNotFound),
        FetchOutcome::Found(body) => body,
    };

    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }
    if Instant::now() >= deadline {
        return Err(IngestError::DeadlineExceeded);
    }

    debug!(%task, bytes = body.len(), "decoding");
    let records = decode::read_archive(&body)?;

    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }

    debug!(%task, rows = records.len(), "writing");
    match store.write(&key, &records, policy, metadata)? {
        WriteOutcome::Committed { rows } => Ok(TaskOutcome::Committed { rows }),
        WriteOutcome::SkippedExists => Ok(TaskOutcome::SkippedExists),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SilentProgress;
    use crate::store::NoopMetadata;
    use crate::task::MarketType;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    fn make_archive(csv_text: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("trades.csv", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(csv_text.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn good_rows() -> String {
        "1,96384.40,0.00315,10,11,1739664000123,true,true\n\
         2,96384.50,1.20000,12,12,1739664000150,false,true\n"
            .to_string()
    }

    /// Canned remote: present archives, injected transient failures,
    /// everything else NotFound. Counts fetches for idempotence tests.
    #[derive(Default)]
    struct MockSource {
        archives: HashMap<(String, NaiveDate), Vec<u8>>,
        transient: Vec<(String, NaiveDate)>,
        fetches: AtomicUsize,
    }

    impl MockSource {
        fn with_archive(mut self, symbol: &str, date: NaiveDate, bytes: Vec<u8>) -> Self {
            self.archives.insert((symbol.to_string(), date), bytes);
            self
        }

        fn with_transient(mut self, symbol: &str, date: NaiveDate) -> Self {
            self.transient.push((symbol.to_string(), date));
            self
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl ArchiveSource for MockSource {
        fn fetch(
            &self,
            task: &Task,
            _cancel: &CancelToken,
            _deadline: Instant,
        ) -> Result<FetchOutcome> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let id = (task.symbol.clone(), task.date);
            if self.transient.contains(&id) {
                return Err(IngestError::Transient {
                    attempts: 3,
                    reason: "connection reset".to_string(),
                });
            }
            match self.archives.get(&id) {
                Some(bytes) => Ok(FetchOutcome::Found(bytes.clone())),
                None => Ok(FetchOutcome::NotFound),
            }
        }
    }

    fn request(symbols: &[&str], start: NaiveDate, end: NaiveDate, policy: OverwritePolicy) -> IngestRequest {
        IngestRequest {
            market: MarketType::Spot,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            start,
            end,
            policy,
        }
    }

    fn config() -> IngestConfig {
        IngestConfig {
            workers: 4,
            ..IngestConfig::default()
        }
    }

    #[test]
    fn two_symbols_two_days_commit_four_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let mut source = MockSource::default();
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            for d in [16, 17] {
                source = source.with_archive(symbol, date(d), make_archive(&good_rows()));
            }
        }

        let report = run_ingestion(
            &request(&["BTCUSDT", "ETHUSDT"], date(16), date(17), OverwritePolicy::Overwrite),
            &source,
            &store,
            &NoopMetadata,
            &config(),
            &CancelToken::new(),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.committed, 4);
        assert!(report.all_succeeded());

        let key = Task::new(MarketType::Spot, "ETHUSDT", date(17)).unwrap().key();
        assert_eq!(store.read(&key).unwrap().len(), 2);
    }

    #[test]
    fn missing_upstream_archive_is_a_skip_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let source = MockSource::default()
            .with_archive("BTCUSDT", date(16), make_archive(&good_rows()));
        // No archive for the 17th.

        let report = run_ingestion(
            &request(&["BTCUSDT"], date(16), date(17), OverwritePolicy::Overwrite),
            &source,
            &store,
            &NoopMetadata,
            &config(),
            &CancelToken::new(),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(report.committed, 1);
        assert_eq!(report.skipped_not_found, 1);
        assert!(report.all_succeeded());

        let missing = Task::new(MarketType::Spot, "BTCUSDT", date(17)).unwrap().key();
        assert!(!store.is_committed(&missing));
    }

    #[test]
    fn malformed_row_fails_the_task_and_leaves_no_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let bad = "1,96384.40,0.00315,10,11,1739664000123,true\n"; // 7 fields
        let source = MockSource::default()
            .with_archive("BTCUSDT", date(16), make_archive(bad))
            .with_archive("ETHUSDT", date(16), make_archive(&good_rows()));

        let report = run_ingestion(
            &request(&["BTCUSDT", "ETHUSDT"], date(16), date(16), OverwritePolicy::Overwrite),
            &source,
            &store,
            &NoopMetadata,
            &config(),
            &CancelToken::new(),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(report.committed, 1);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.failures[0].cause,
            IngestError::RecordFormat { row: 1, .. }
        ));

        let failed_key = Task::new(MarketType::Spot, "BTCUSDT", date(16)).unwrap().key();
        assert!(!store.is_committed(&failed_key));
    }

    #[test]
    fn transient_failure_does_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let source = MockSource::default()
            .with_archive("BTCUSDT", date(16), make_archive(&good_rows()))
            .with_transient("BTCUSDT", date(17));

        let report = run_ingestion(
            &request(&["BTCUSDT"], date(16), date(17), OverwritePolicy::Overwrite),
            &source,
            &store,
            &NoopMetadata,
            &config(),
            &CancelToken::new(),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(report.committed, 1);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.failures[0].cause,
            IngestError::Transient { .. }
        ));
    }

    #[test]
    fn skip_if_exists_rerun_fetches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let source = MockSource::default()
            .with_archive("BTCUSDT", date(16), make_archive(&good_rows()))
            .with_archive("BTCUSDT", date(17), make_archive(&good_rows()));
        let req = request(&["BTCUSDT"], date(16), date(17), OverwritePolicy::SkipIfExists);

        let first = run_ingestion(
            &req, &source, &store, &NoopMetadata, &config(), &CancelToken::new(), &SilentProgress,
        )
        .unwrap();
        assert_eq!(first.committed, 2);
        assert_eq!(source.fetch_count(), 2);

        let second = run_ingestion(
            &req, &source, &store, &NoopMetadata, &config(), &CancelToken::new(), &SilentProgress,
        )
        .unwrap();
        assert_eq!(second.skipped_exists, 2);
        assert_eq!(second.committed, 0);
        // The short-circuit happens before the fetch stage.
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn overwrite_rerun_fetches_and_recommits_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let source = MockSource::default()
            .with_archive("BTCUSDT", date(16), make_archive(&good_rows()));
        let req = request(&["BTCUSDT"], date(16), date(16), OverwritePolicy::Overwrite);

        for _ in 0..2 {
            let report = run_ingestion(
                &req, &source, &store, &NoopMetadata, &config(), &CancelToken::new(), &SilentProgress,
            )
            .unwrap();
            assert_eq!(report.committed, 1);
        }
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn exhausted_deadline_marks_the_task_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let source = MockSource::default()
            .with_archive("BTCUSDT", date(16), make_archive(&good_rows()));
        let config = IngestConfig {
            workers: 1,
            task_deadline: std::time::Duration::ZERO,
            ..IngestConfig::default()
        };

        let report = run_ingestion(
            &request(&["BTCUSDT"], date(16), date(16), OverwritePolicy::Overwrite),
            &source,
            &store,
            &NoopMetadata,
            &config,
            &CancelToken::new(),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.failures[0].cause,
            IngestError::DeadlineExceeded
        ));
        let key = Task::new(MarketType::Spot, "BTCUSDT", date(16)).unwrap().key();
        assert!(!store.is_committed(&key));
    }

    #[test]
    fn cancelled_run_drains_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let source = MockSource::default()
            .with_archive("BTCUSDT", date(16), make_archive(&good_rows()))
            .with_archive("BTCUSDT", date(17), make_archive(&good_rows()));
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = run_ingestion(
            &request(&["BTCUSDT"], date(16), date(17), OverwritePolicy::Overwrite),
            &source,
            &store,
            &NoopMetadata,
            &config(),
            &cancel,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.failed(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f.cause, IngestError::Cancelled)));
        assert!(store
            .committed_dates(MarketType::Spot, "BTCUSDT")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn invalid_symbol_fails_the_whole_request_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let source = MockSource::default();

        let result = run_ingestion(
            &request(&["BTC/USDT"], date(16), date(16), OverwritePolicy::Overwrite),
            &source,
            &store,
            &NoopMetadata,
            &config(),
            &CancelToken::new(),
            &SilentProgress,
        );
        assert!(matches!(result, Err(IngestError::InvalidSymbol(_))));
        assert_eq!(source.fetch_count(), 0);
    }
}
