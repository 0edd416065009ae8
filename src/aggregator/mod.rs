use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::calculator::OhlcCalculator;
use crate::domain::{OhlcBar, Symbol, TradeEvent};

/// Update-channel buffer capacity. Bursty absorption without unbounded
/// memory; matches the spec's "buffered (>= 500)" requirement.
const UPDATE_CHANNEL_CAPACITY: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("symbol not registered: {0}")]
pub struct UnknownSymbol(pub Symbol);

/// Owns one [`OhlcCalculator`] per supported symbol, fixed for the
/// process's lifetime (invariant 1).
///
/// Each calculator is behind its own `Mutex` so the ingress/tick loop
/// stays the sole writer while `bar()` can be called concurrently from
/// the push dispatcher and persist worker without a crate-wide lock.
pub struct Aggregator {
    calculators: HashMap<Symbol, Mutex<OhlcCalculator>>,
}

impl Aggregator {
    pub fn new(symbols: &[Symbol]) -> Self {
        let calculators = symbols
            .iter()
            .map(|s| (s.clone(), Mutex::new(OhlcCalculator::new())))
            .collect();
        Self { calculators }
    }

    /// Returns the current bar for `symbol` by value, or `UnknownSymbol`
    /// if it isn't in the fixed supported set.
    pub fn bar(&self, symbol: &Symbol) -> Result<OhlcBar, UnknownSymbol> {
        self.calculators
            .get(symbol)
            .map(|calc| calc.lock().bar())
            .ok_or_else(|| UnknownSymbol(symbol.clone()))
    }

    pub fn supports(&self, symbol: &Symbol) -> bool {
        self.calculators.contains_key(symbol)
    }

    fn apply(&self, event: &TradeEvent) -> bool {
        match self.calculators.get(&event.symbol) {
            Some(calc) => {
                calc.lock().update(event);
                true
            }
            None => false,
        }
    }

    fn tick_all(&self, now: i64) {
        for calc in self.calculators.values() {
            calc.lock().tick(now);
        }
    }
}

/// Spawns the combined ingress/ticker loop described in the design notes:
/// routing both through one `select!` keeps each calculator single-writer
/// without a per-calculator mutex being load-bearing for correctness (it
/// remains here only so concurrent readers stay safe).
///
/// Returns the "updated symbol" channel and the task handle; the channel
/// closes once `done` cancels or `event_rx` closes.
pub fn spawn(
    aggregator: Arc<Aggregator>,
    event_rx: async_channel::Receiver<TradeEvent>,
    done: CancellationToken,
) -> (async_channel::Receiver<Symbol>, JoinHandle<()>) {
    let (update_tx, update_rx) = async_channel::bounded(UPDATE_CHANNEL_CAPACITY);

    let handle = tokio::spawn(run(aggregator, event_rx, update_tx, done));

    (update_rx, handle)
}

#[tracing::instrument(skip_all)]
async fn run(
    aggregator: Arc<Aggregator>,
    event_rx: async_channel::Receiver<TradeEvent>,
    update_tx: async_channel::Sender<Symbol>,
    done: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = done.cancelled() => {
                tracing::debug!("aggregator received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                let now = now_seconds();
                aggregator.tick_all(now);
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !aggregator.apply(&event) {
                            tracing::warn!(symbol = %event.symbol, "event for undeclared symbol dropped");
                            continue;
                        }
                        if update_tx.send(event.symbol).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::debug!("upstream event channel closed");
                        break;
                    }
                }
            }
        }
    }
    // update_tx drops here, closing update_rx for downstream consumers.
}

fn now_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn symbol(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn event(symbol: Symbol, price: &str, trade_time: i64) -> TradeEvent {
        TradeEvent {
            symbol,
            price: price.to_string(),
            trade_time,
        }
    }

    /// Property 7 / scenario: N events across K symbols produce exactly N
    /// per-symbol-FIFO update notifications.
    #[tokio::test]
    async fn fan_out_is_fifo_per_symbol() {
        let eth = symbol("ETHBTC");
        let bnb = symbol("BNBBTC");
        let aggregator = Arc::new(Aggregator::new(&[eth.clone(), bnb.clone()]));

        let (event_tx, event_rx) = async_channel::unbounded();
        let done = CancellationToken::new();
        let (update_rx, handle) = spawn(aggregator.clone(), event_rx, done.clone());

        event_tx
            .send(event(eth.clone(), "0.1", 1_737_734_701))
            .await
            .unwrap();
        event_tx
            .send(event(bnb.clone(), "0.2", 1_737_734_701))
            .await
            .unwrap();
        drop(event_tx);

        let first = update_rx.recv().await.unwrap();
        let second = update_rx.recv().await.unwrap();
        assert_eq!(first, eth);
        assert_eq!(second, bnb);
        assert!(update_rx.recv().await.is_err());

        handle.await.unwrap();
        assert_eq!(aggregator.bar(&eth).unwrap().open, "0.1");
        assert_eq!(aggregator.bar(&bnb).unwrap().open, "0.2");
    }

    #[tokio::test]
    async fn unknown_symbol_is_dropped_not_fatal() {
        let eth = symbol("ETHBTC");
        let aggregator = Arc::new(Aggregator::new(&[eth.clone()]));
        let (event_tx, event_rx) = async_channel::unbounded();
        let done = CancellationToken::new();
        let (update_rx, handle) = spawn(aggregator, event_rx, done);

        event_tx
            .send(event(symbol("XYZ"), "0.1", 1))
            .await
            .unwrap();
        event_tx
            .send(event(eth.clone(), "0.2", 2))
            .await
            .unwrap();
        drop(event_tx);

        let only = update_rx.recv().await.unwrap();
        assert_eq!(only, eth);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_update_channel() {
        let aggregator = Arc::new(Aggregator::new(&[symbol("ETHBTC")]));
        let (_event_tx, event_rx) = async_channel::unbounded();
        let done = CancellationToken::new();
        let (update_rx, handle) = spawn(aggregator, event_rx, done.clone());

        done.cancel();
        tokio::time::timeout(StdDuration::from_secs(1), handle)
            .await
            .expect("worker exited within budget")
            .unwrap();
        assert!(update_rx.recv().await.is_err());
    }

    #[test]
    fn bar_of_unregistered_symbol_is_an_error() {
        let aggregator = Aggregator::new(&[symbol("ETHBTC")]);
        assert_eq!(
            aggregator.bar(&symbol("NOEXIST")),
            Err(UnknownSymbol(symbol("NOEXIST")))
        );
    }
}
