pub mod binance;

pub use binance::BinanceAdapter;

use tokio_util::sync::CancellationToken;

use crate::domain::{Symbol, TradeEvent};
use crate::error::UpstreamError;

/// Connects to an exchange and produces a typed trade-event channel.
/// `BinanceAdapter` is the sole production implementor; tests substitute
/// an in-memory fake so the aggregator and its workers can be exercised
/// without a live exchange connection.
#[async_trait::async_trait]
pub trait UpstreamAdapter: Send + Sync {
    async fn connect(
        &self,
        symbols: &[Symbol],
        on_error: Box<dyn Fn(UpstreamError) + Send + 'static>,
        done: CancellationToken,
    ) -> Result<async_channel::Receiver<TradeEvent>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A fake adapter that replays a fixed batch of events instead of
    /// opening a websocket, standing in for `BinanceAdapter` in tests
    /// that exercise the aggregation pipeline end to end.
    struct FakeAdapter {
        events: Vec<TradeEvent>,
    }

    #[async_trait::async_trait]
    impl UpstreamAdapter for FakeAdapter {
        async fn connect(
            &self,
            _symbols: &[Symbol],
            _on_error: Box<dyn Fn(UpstreamError) + Send + 'static>,
            _done: CancellationToken,
        ) -> Result<async_channel::Receiver<TradeEvent>, UpstreamError> {
            let (tx, rx) = async_channel::unbounded();
            for event in self.events.clone() {
                tx.send(event).await.unwrap();
            }
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn fake_adapter_satisfies_the_trait() {
        let symbol = Symbol::parse("ETHBTC").unwrap();
        let adapter = FakeAdapter {
            events: vec![TradeEvent {
                symbol: symbol.clone(),
                price: "0.1".to_string(),
                trade_time: 1_737_734_701,
            }],
        };

        let done = CancellationToken::new();
        let rx = adapter
            .connect(&[symbol.clone()], Box::new(|_| {}), done)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.symbol, symbol);
    }
}
