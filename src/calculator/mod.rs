pub mod ohlc;

pub use ohlc::OhlcCalculator;
