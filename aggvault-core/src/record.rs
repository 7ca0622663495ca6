//! Typed trade records and row parsing.
//!
//! Archive rows are headerless and positional; the column order is fixed by
//! the upstream data repository. Price and quantity are kept as exact
//! decimals — a binary float would drift on values like `0.00000001` and
//! this is a financial dataset.
//!
//! Policy: one malformed row rejects the whole day. Silently dropping rows
//! would lose data with no trace, so the task fails instead and the row
//! number is reported.

use rust_decimal::Decimal;
use thiserror::Error;

/// Fixed column count of an archive row.
pub const FIELDS_PER_ROW: usize = 8;

/// One aggregate trade, field order exactly as in the archive:
/// agg_trade_id, price, quantity, first_trade_id, last_trade_id,
/// timestamp_ms, is_buyer_maker, is_best_match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRecord {
    pub agg_trade_id: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub timestamp_ms: i64,
    pub is_buyer_maker: bool,
    pub is_best_match: bool,
}

impl TradeRecord {
    /// Serialize back to the positional field layout. Decimals keep their
    /// source scale (`4.00` stays `4.00`), booleans are written lowercase.
    pub fn to_fields(&self) -> [String; FIELDS_PER_ROW] {
        [
            self.agg_trade_id.to_string(),
            self.price.to_string(),
            self.quantity.to_string(),
            self.first_trade_id.to_string(),
            self.last_trade_id.to_string(),
            self.timestamp_ms.to_string(),
            bool_str(self.is_buyer_maker).to_string(),
            bool_str(self.is_best_match).to_string(),
        ]
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Why a single row failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRowError {
    #[error("expected {FIELDS_PER_ROW} fields, got {0}")]
    FieldCount(usize),

    #[error("{name}: invalid integer {value:?}")]
    InvalidInt { name: &'static str, value: String },

    #[error("{name}: invalid decimal {value:?}")]
    InvalidDecimal { name: &'static str, value: String },

    #[error("{name}: invalid boolean {value:?}")]
    InvalidBool { name: &'static str, value: String },
}

/// Parse one positional row into a typed record.
pub fn parse_row(row: &csv::StringRecord) -> Result<TradeRecord, ParseRowError> {
    if row.len() != FIELDS_PER_ROW {
        return Err(ParseRowError::FieldCount(row.len()));
    }

    Ok(TradeRecord {
        agg_trade_id: parse_int("agg_trade_id", &row[0])?,
        price: parse_decimal("price", &row[1])?,
        quantity: parse_decimal("quantity", &row[2])?,
        first_trade_id: parse_int("first_trade_id", &row[3])?,
        last_trade_id: parse_int("last_trade_id", &row[4])?,
        timestamp_ms: parse_int("timestamp_ms", &row[5])?,
        is_buyer_maker: parse_bool("is_buyer_maker", &row[6])?,
        is_best_match: parse_bool("is_best_match", &row[7])?,
    })
}

fn parse_int(name: &'static str, value: &str) -> Result<i64, ParseRowError> {
    value.trim().parse().map_err(|_| ParseRowError::InvalidInt {
        name,
        value: value.to_string(),
    })
}

fn parse_decimal(name: &'static str, value: &str) -> Result<Decimal, ParseRowError> {
    value
        .trim()
        .parse()
        .map_err(|_| ParseRowError::InvalidDecimal {
            name,
            value: value.to_string(),
        })
}

/// The archives encode booleans either lowercase or Python-capitalized,
/// depending on the market and export vintage; both are accepted.
fn parse_bool(name: &'static str, value: &str) -> Result<bool, ParseRowError> {
    match value.trim() {
        "true" | "True" => Ok(true),
        "false" | "False" => Ok(false),
        _ => Err(ParseRowError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}
