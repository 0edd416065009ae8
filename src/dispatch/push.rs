use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::domain::Symbol;
use crate::registry::SubscriptionRegistry;
use crate::rpc::handler::bar_to_response;

/// Drains the update channel and fans each symbol's current bar out to
/// every live subscriber on that symbol. Never blocks on a slow
/// subscriber beyond the outbound channel's own buffering — a full
/// subscriber channel is logged, not retried, and the subscriber is left
/// for the RPC handler to remove on its next `Receive` error.
pub fn spawn(
    aggregator: Arc<Aggregator>,
    registry: Arc<SubscriptionRegistry>,
    update_rx: async_channel::Receiver<Symbol>,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(aggregator, registry, update_rx, done))
}

#[tracing::instrument(skip_all)]
async fn run(
    aggregator: Arc<Aggregator>,
    registry: Arc<SubscriptionRegistry>,
    update_rx: async_channel::Receiver<Symbol>,
    done: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = done.cancelled() => {
                tracing::debug!("push dispatcher received shutdown signal");
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
                let Some(response) = bar_to_response(&bar) else {
                    continue;
                };
                registry.fanout(&symbol, |subscriber| {
                    if subscriber.try_send(response.clone()).is_err() {
                        tracing::debug!(%symbol, "dropped update for a stalled subscriber");
                    }
                });
            }
        }
    }
}
