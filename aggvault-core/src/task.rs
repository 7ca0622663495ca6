//! Task identity and request expansion.
//!
//! A [`Task`] binds one (market, symbol, date) triple to exactly one remote
//! archive and one output partition. Tasks are immutable value objects;
//! symbols are validated and normalized to uppercase before a task exists,
//! so no later stage ever sees a malformed symbol.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{IngestError, Result};
use crate::locate::PartitionKey;
use crate::store::OverwritePolicy;

/// Which side of the exchange the archive covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    /// Path segment used in both the remote URL and the partition hierarchy.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "spot" => Ok(MarketType::Spot),
            "futures" => Ok(MarketType::Futures),
            other => Err(format!("unknown market type {other:?} (expected spot or futures)")),
        }
    }
}

/// Validate a trading-pair symbol and normalize it to uppercase.
pub fn normalize_symbol(symbol: &str) -> Result<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(IngestError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// One unit of work: one archive fetch, one partition write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Task {
    pub market: MarketType,
    pub symbol: String,
    pub date: NaiveDate,
}

impl Task {
    /// Build a task, rejecting malformed symbols up front.
    pub fn new(market: MarketType, symbol: &str, date: NaiveDate) -> Result<Self> {
        Ok(Self {
            market,
            symbol: normalize_symbol(symbol)?,
            date,
        })
    }

    /// The partition this task writes.
    pub fn key(&self) -> PartitionKey {
        PartitionKey {
            market: self.market,
            symbol: self.symbol.clone(),
            date: self.date,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.market, self.symbol, self.date)
    }
}

/// A batch request: (symbols × inclusive date range) for one market.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub market: MarketType,
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub policy: OverwritePolicy,
}

impl IngestRequest {
    /// Expand into one task per (symbol, date) pair, both endpoints included.
    pub fn expand(&self) -> Result<Vec<Task>> {
        if self.start > self.end {
            return Err(IngestError::InvalidDateRange {
                start: self.start,
                end: self.end,
            });
        }

        let mut tasks = Vec::new();
        for symbol in &self.symbols {
            let symbol = normalize_symbol(symbol)?;
            let mut date = self.start;
            while date <= self.end {
                tasks.push(Task {
                    market: self.market,
                    symbol: symbol.clone(),
                    date,
                });
                date = match date.succ_opt() {
                    Some(next) => next,
                    None => break,
                };
            }
        }
        Ok(tasks)
    }
}
