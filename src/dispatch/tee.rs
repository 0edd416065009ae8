use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::Symbol;

/// Buffer for each of the tee's two outbound legs.
const TEE_CHANNEL_CAPACITY: usize = 500;

/// Splits a single update channel into two, one per consumer, so the push
/// dispatcher and the persist worker can run as independent readers
/// instead of racing over one receiver. Used only when both legs are
/// enabled; with a single consumer the aggregator's own channel is handed
/// to it directly.
pub fn spawn(
    update_rx: async_channel::Receiver<Symbol>,
    done: CancellationToken,
) -> (
    async_channel::Receiver<Symbol>,
    async_channel::Receiver<Symbol>,
    JoinHandle<()>,
) {
    let (tx_a, rx_a) = async_channel::bounded(TEE_CHANNEL_CAPACITY);
    let (tx_b, rx_b) = async_channel::bounded(TEE_CHANNEL_CAPACITY);
    let handle = tokio::spawn(run(update_rx, tx_a, tx_b, done));
    (rx_a, rx_b, handle)
}

#[tracing::instrument(skip_all)]
async fn run(
    update_rx: async_channel::Receiver<Symbol>,
    tx_a: async_channel::Sender<Symbol>,
    tx_b: async_channel::Sender<Symbol>,
    done: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = done.cancelled() => {
                tracing::debug!("tee received shutdown signal");
                break;
            }
            symbol = update_rx.recv() => {
                let Ok(symbol) = symbol else {
                    tracing::debug!("update channel closed");
                    break;
                };
                if tx_a.send(symbol.clone()).await.is_err() || tx_b.send(symbol).await.is_err() {
                    break;
                }
            }
        }
    }
    // Sole producer for both legs: closing them signals shutdown downstream.
    drop(tx_a);
    drop(tx_b);
}
