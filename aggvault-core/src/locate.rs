//! Pure address computation: remote archive URL and local partition path.
//!
//! Both functions are deterministic string templates with no I/O. Symbol
//! validation happens when a [`Task`] is constructed, so everything here
//! operates on already-normalized input.

use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};

use crate::task::{MarketType, Task};

/// Remote address of the daily archive for a task:
/// `{base}/data/{market}/daily/aggTrades/{SYMBOL}/{SYMBOL}-aggTrades-{yyyy-mm-dd}.zip`
pub fn remote_url(base_url: &str, task: &Task) -> String {
    format!(
        "{}/data/{}/daily/aggTrades/{}/{}-aggTrades-{}.zip",
        base_url.trim_end_matches('/'),
        task.market.as_str(),
        task.symbol,
        task.symbol,
        task.date.format("%Y-%m-%d"),
    )
}

/// Identity of one persisted output unit: (market, symbol, year, month, day).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub market: MarketType,
    pub symbol: String,
    pub date: NaiveDate,
}

impl PartitionKey {
    /// Relative path under the store root:
    /// `{market}/{SYMBOL}/{yyyy}/{mm}/{SYMBOL}-{yyyymmdd}.csv`
    ///
    /// The day lives in the file name; the directory levels above it are
    /// the fixed partition hierarchy.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.market.as_str())
            .join(&self.symbol)
            .join(format!("{:04}", self.date.year()))
            .join(format!("{:02}", self.date.month()))
            .join(self.file_name())
    }

    /// Partition file name: `{SYMBOL}-{yyyymmdd}.csv`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.csv", self.symbol, self.date.format("%Y%m%d"))
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.market, self.symbol, self.date)
    }
}
