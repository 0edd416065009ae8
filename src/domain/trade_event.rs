use crate::domain::symbol::Symbol;

/// A single aggregated-trade event from the upstream exchange.
///
/// Immutable once produced; price is carried verbatim as the exchange's
/// own textual form so no precision is lost before it reaches a
/// calculator or the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    pub symbol: Symbol,
    pub price: String,
    pub trade_time: i64,
}
