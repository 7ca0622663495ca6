//! Archive decoding: single-entry ZIP → ordered trade records.
//!
//! The pipeline assumes a one-archive-to-one-partition relationship, so an
//! archive with zero entries or more than one entry is a format error, not
//! something to work around. The CSV entry is streamed row by row straight
//! out of the decompressor; rows are never re-sorted.

use std::io::Cursor;

use tracing::debug;
use zip::ZipArchive;

use crate::error::{IngestError, Result};
use crate::record::{self, TradeRecord};

/// Decode archive bytes and parse every row, preserving order.
///
/// Each task decodes its own archive from scratch; there is no mid-stream
/// resume. Memory stays proportional to one day's records.
pub fn read_archive(bytes: &[u8]) -> Result<Vec<TradeRecord>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| IngestError::ArchiveFormat(format!("not a valid zip archive: {e}")))?;

    match archive.len() {
        1 => {}
        0 => {
            return Err(IngestError::ArchiveFormat(
                "archive contains no entries".to_string(),
            ))
        }
        n => {
            return Err(IngestError::ArchiveFormat(format!(
                "archive contains {n} entries, expected exactly one"
            )))
        }
    }

    let entry = archive
        .by_index(0)
        .map_err(|e| IngestError::ArchiveFormat(format!("corrupt archive entry: {e}")))?;
    debug!(entry = %entry.name(), "decoding archive entry");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(entry);

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row_number = index as u64 + 1;
        let row = row.map_err(|e| match e.kind() {
            // An I/O error here means the compressed stream itself broke.
            csv::ErrorKind::Io(_) => {
                IngestError::ArchiveFormat(format!("corrupt compressed stream: {e}"))
            }
            _ => IngestError::RecordFormat {
                row: row_number,
                reason: e.to_string(),
            },
        })?;

        let record = record::parse_row(&row).map_err(|e| IngestError::RecordFormat {
            row: row_number,
            reason: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}
