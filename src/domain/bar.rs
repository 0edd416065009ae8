use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A one-minute OHLC candlestick snapshot.
///
/// Prices keep the exchange's textual form so the wire representation is
/// lossless; comparisons go through [`Decimal`] rather than lexicographic
/// string compare (see the calculator's precision invariant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    /// Unix seconds of the most recent trade folded into this bar.
    pub trade_time: i64,
}

impl OhlcBar {
    pub fn zero() -> Self {
        Self {
            open: "0".to_string(),
            high: "0".to_string(),
            low: "0".to_string(),
            close: "0".to_string(),
            trade_time: 0,
        }
    }

    pub fn opening_at(price: &str, trade_time: i64) -> Self {
        Self {
            open: price.to_string(),
            high: price.to_string(),
            low: price.to_string(),
            close: price.to_string(),
            trade_time,
        }
    }
}

/// Parses a price field into a [`Decimal`] for comparison or persistence,
/// per the numeric precision invariant: the textual form is kept verbatim
/// on the wire, but every comparison is numeric.
pub fn parse_price(value: &str) -> Result<Decimal, rust_decimal::Error> {
    value.parse()
}
