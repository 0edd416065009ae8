use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::domain::Symbol;
use crate::persist::BarStore;

/// Caps how long a single write is allowed to stall the persist worker.
/// A store that hangs should not wedge the candle pipeline; a timed-out
/// write is logged and dropped rather than retried.
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Drains the update channel and writes each symbol's current bar to the
/// store. Runs independently of the push dispatcher: a slow or failing
/// store never holds up live fan-out.
pub fn spawn(
    store: Arc<dyn BarStore>,
    aggregator: Arc<Aggregator>,
    update_rx: async_channel::Receiver<Symbol>,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(store, aggregator, update_rx, done))
}

#[tracing::instrument(skip_all)]
async fn run(
    store: Arc<dyn BarStore>,
    aggregator: Arc<Aggregator>,
    update_rx: async_channel::Receiver<Symbol>,
    done: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = done.cancelled() => {
                tracing::debug!("persist worker received shutdown signal");
                break;
            }
            symbol = update_rx.recv() => {
                let Ok(symbol) = symbol else {
                    tracing::debug!("update channel closed");
                    break;
                };
                let bar = match aggregator.bar(&symbol) {
                    Ok(bar) => bar,
                    Err(err) => {
                        tracing::error!(error = %err, "registered symbol missing from aggregator");
                        continue;
                    }
                };
                match tokio::time::timeout(WRITE_TIMEOUT, store.create_bar(&bar)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::error!(error = %err, %symbol, "failed to persist bar"),
                    Err(_) => tracing::error!(%symbol, "persisting bar timed out"),
                }
            }
        }
    }
}
