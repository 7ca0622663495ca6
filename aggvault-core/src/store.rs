//! Partitioned persistence with atomic commit semantics.
//!
//! Layout: `{root}/{market}/{SYMBOL}/{yyyy}/{mm}/{SYMBOL}-{yyyymmdd}.csv`
//!
//! A partition is committed if and only if its final file exists: writes go
//! to a `.tmp` sibling first and a single `fs::rename` publishes them, so a
//! reader can never observe a half-written partition. On any failure the
//! temporary artifact is removed and a previously committed partition is
//! left untouched.
//!
//! Partition files are headerless CSV in the archive's own field order;
//! decimals keep their source scale so a downstream loader reproduces the
//! schema exactly.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::locate::PartitionKey;
use crate::record::{self, TradeRecord};
use crate::task::MarketType;

/// What to do when the target partition is already committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Re-fetch and re-commit unconditionally.
    Overwrite,
    /// Leave the committed partition alone and skip the work.
    SkipIfExists,
}

/// Result of a write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed { rows: usize },
    SkippedExists,
}

/// Per-commit summary handed to the metadata sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub rows: usize,
    pub first_timestamp_ms: Option<i64>,
    pub last_timestamp_ms: Option<i64>,
}

impl PartitionSummary {
    fn of(records: &[TradeRecord]) -> Self {
        Self {
            rows: records.len(),
            first_timestamp_ms: records.first().map(|r| r.timestamp_ms),
            last_timestamp_ms: records.last().map(|r| r.timestamp_ms),
        }
    }
}

/// Extension point for a future centralized metadata store. Called once per
/// successful commit; there are deliberately no per-partition sidecar files.
pub trait MetadataSink: Send + Sync {
    fn record_committed(&self, key: &PartitionKey, summary: &PartitionSummary);
}

/// Current metadata implementation: nothing.
pub struct NoopMetadata;

impl MetadataSink for NoopMetadata {
    fn record_committed(&self, _key: &PartitionKey, _summary: &PartitionSummary) {}
}

/// The on-disk partition store.
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the partition file for a key.
    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// A partition is committed exactly when its final file exists.
    pub fn is_committed(&self, key: &PartitionKey) -> bool {
        self.partition_path(key).is_file()
    }

    /// Write a day's records, honoring the overwrite policy.
    ///
    /// Exactly one task targets a given key within a run, so the atomic
    /// rename is the only synchronization needed per partition.
    pub fn write(
        &self,
        key: &PartitionKey,
        records: &[TradeRecord],
        policy: OverwritePolicy,
        metadata: &dyn MetadataSink,
    ) -> Result<WriteOutcome> {
        let path = self.partition_path(key);

        if policy == OverwritePolicy::SkipIfExists && path.is_file() {
            return Ok(WriteOutcome::SkippedExists);
        }

        let parent = path
            .parent()
            .ok_or_else(|| IngestError::Persistence(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent).map_err(|e| {
            IngestError::Persistence(format!("create {}: {e}", parent.display()))
        })?;

        // Temp file in the same directory so the rename stays on one volume.
        let tmp = path.with_extension("csv.tmp");
        if let Err(e) = write_records(&tmp, records) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            IngestError::Persistence(format!("atomic rename into {}: {e}", path.display()))
        })?;

        debug!(partition = %key, rows = records.len(), "committed partition");
        metadata.record_committed(key, &PartitionSummary::of(records));

        Ok(WriteOutcome::Committed {
            rows: records.len(),
        })
    }

    /// Load one committed partition back, in stored order.
    pub fn read(&self, key: &PartitionKey) -> Result<Vec<TradeRecord>> {
        let path = self.partition_path(key);
        let file = fs::File::open(&path).map_err(|e| {
            IngestError::Persistence(format!("open partition {}: {e}", path.display()))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut records = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row_number = index as u64 + 1;
            let row = row.map_err(|e| IngestError::Persistence(format!(
                "read partition {}: {e}",
                path.display()
            )))?;
            let record = record::parse_row(&row).map_err(|e| IngestError::RecordFormat {
                row: row_number,
                reason: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Dates with a committed partition for (market, symbol), ascending.
    pub fn committed_dates(&self, market: MarketType, symbol: &str) -> Result<Vec<NaiveDate>> {
        let symbol_dir = self.root.join(market.as_str()).join(symbol);
        if !symbol_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut dates = Vec::new();
        for year_entry in read_dir(&symbol_dir)? {
            let year_dir = year_entry.path();
            if !year_dir.is_dir() {
                continue;
            }
            for month_entry in read_dir(&year_dir)? {
                let month_dir = month_entry.path();
                if !month_dir.is_dir() {
                    continue;
                }
                for file_entry in read_dir(&month_dir)? {
                    let path = file_entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                        continue;
                    }
                    if let Some(date) = date_from_file_name(&path) {
                        dates.push(date);
                    }
                }
            }
        }

        dates.sort_unstable();
        Ok(dates)
    }
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| IngestError::Persistence(format!("read dir {}: {e}", dir.display())))?;
    entries
        .map(|entry| {
            entry.map_err(|e| IngestError::Persistence(format!("dir entry in {}: {e}", dir.display())))
        })
        .collect()
}

/// Parse `{SYMBOL}-{yyyymmdd}.csv` back to its date; anything else is skipped.
fn date_from_file_name(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let (_, date_part) = stem.rsplit_once('-')?;
    NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()
}

fn write_records(path: &Path, records: &[TradeRecord]) -> Result<()> {
    let file = fs::File::create(path)
        .map_err(|e| IngestError::Persistence(format!("create {}: {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);

    for record in records {
        writer.write_record(&record.to_fields()).map_err(|e| {
            IngestError::Persistence(format!("write {}: {e}", path.display()))
        })?;
    }
    writer
        .flush()
        .map_err(|e| IngestError::Persistence(format!("flush {}: {e}", path.display())))
}
