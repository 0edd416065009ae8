use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::aggregator::Aggregator;
use crate::domain::Symbol;
use crate::error::RpcError;
use crate::registry::{Subscriber, SubscriptionRegistry};
use crate::rpc::proto::aggr_server::Aggr;
use crate::rpc::proto::{
    candlesticks1m_stream_response::Update, Bar, Candlesticks1MStreamRequest,
    Candlesticks1MStreamResponse,
};

/// Outbound channel buffer per subscriber. Bounded so a stalled client
/// can't grow memory without limit; the dispatcher treats a full channel
/// as a dropped update rather than blocking (see the push dispatcher).
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

pub struct AggrService {
    aggregator: Arc<Aggregator>,
    registry: Arc<SubscriptionRegistry>,
}

impl AggrService {
    pub fn new(aggregator: Arc<Aggregator>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            aggregator,
            registry,
        }
    }
}

/// Tracks the per-connection state machine described in the spec:
/// `NEW -> SUBSCRIBED(id, symbols)`, with later requests either extending
/// the symbol set (same `request_id`) or terminating the stream
/// (different `request_id`).
struct SubscriptionState {
    request_id: String,
    symbols: HashSet<Symbol>,
}

impl SubscriptionState {
    /// Validates `req` against `aggregator`'s supported set and, on the
    /// first call, establishes the request_id; returns the symbols newly
    /// added by this message (the set-difference the caller must apply
    /// to the registry).
    fn apply(
        state: &mut Option<Self>,
        aggregator: &Aggregator,
        req: Candlesticks1MStreamRequest,
    ) -> Result<Vec<Symbol>, RpcError> {
        if req.request_id.is_empty() {
            return Err(RpcError::EmptyRequestId);
        }
        if req.symbols.is_empty() {
            return Err(RpcError::EmptySymbols);
        }
        let mut parsed = Vec::with_capacity(req.symbols.len());
        for raw in &req.symbols {
            let symbol = Symbol::parse(raw).map_err(|_| RpcError::UnsupportedSymbol(raw.clone()))?;
            if !aggregator.supports(&symbol) {
                return Err(RpcError::UnsupportedSymbol(raw.clone()));
            }
            parsed.push(symbol);
        }

        match state {
            None => {
                let symbols: HashSet<Symbol> = parsed.into_iter().collect();
                let new_symbols = symbols.iter().cloned().collect();
                *state = Some(SubscriptionState {
                    request_id: req.request_id,
                    symbols,
                });
                Ok(new_symbols)
            }
            Some(existing) => {
                if existing.request_id != req.request_id {
                    return Err(RpcError::RequestIdChanged {
                        expected: existing.request_id.clone(),
                        got: req.request_id,
                    });
                }
                let new_symbols: Vec<Symbol> = parsed
                    .into_iter()
                    .filter(|s| !existing.symbols.contains(s))
                    .collect();
                existing.symbols.extend(new_symbols.iter().cloned());
                Ok(new_symbols)
            }
        }
    }
}

/// Mirrors the original handler's distinction: a failed first `Receive`
/// (no subscription was ever established) reports `FailedPrecondition`; a
/// later transport error reports `Unknown`.
fn classify_receive_error(first_message: bool, status: Status) -> RpcError {
    if first_message {
        RpcError::FirstReceiveFailed(status)
    } else {
        RpcError::Transport(status)
    }
}

pub fn bar_to_response(bar: &crate::domain::OhlcBar) -> Option<Candlesticks1MStreamResponse> {
    let updated_at = chrono::DateTime::from_timestamp(bar.trade_time, 0)?;
    Some(Candlesticks1MStreamResponse {
        update: Some(Update::Bar(Bar {
            high: bar.high.clone(),
            low: bar.low.clone(),
            open: bar.open.clone(),
            close: bar.close.clone(),
            updated_at: Some(prost_types::Timestamp {
                seconds: updated_at.timestamp(),
                nanos: 0,
            }),
        })),
    })
}

#[tonic::async_trait]
impl Aggr for AggrService {
    type Candlesticks1MStreamStream =
        Pin<Box<dyn Stream<Item = Result<Candlesticks1MStreamResponse, Status>> + Send>>;

    #[tracing::instrument(skip_all)]
    async fn candlesticks1m_stream(
        &self,
        request: Request<Streaming<Candlesticks1MStreamRequest>>,
    ) -> Result<Response<Self::Candlesticks1MStreamStream>, Status> {
        let mut inbound = request.into_inner();
        let (outbound_tx, outbound_rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let subscriber = Subscriber::new(outbound_tx.clone());

        let aggregator = self.aggregator.clone();
        let registry = self.registry.clone();

        tokio::spawn(async move {
            let mut state: Option<SubscriptionState> = None;
            let mut registered: Vec<Symbol> = Vec::new();
            let mut first_message = true;

            loop {
                match inbound.message().await {
                    Ok(Some(req)) => {
                        first_message = false;
                        match SubscriptionState::apply(&mut state, &aggregator, req) {
                            Ok(new_symbols) if new_symbols.is_empty() => {}
                            Ok(new_symbols) => {
                                registry.add(&new_symbols, &subscriber);
                                registered.extend(new_symbols);
                            }
                            Err(err) => {
                                tracing::info!(error = %err, "rejecting subscription request");
                                let _ = outbound_tx.send(Err(err.into())).await;
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("client closed Candlesticks1MStream");
                        break;
                    }
                    Err(status) => {
                        let err = classify_receive_error(first_message, status);
                        tracing::warn!(error = %err, "transport error receiving from client");
                        let _ = outbound_tx.send(Err(err.into())).await;
                        break;
                    }
                }
            }

            // Guaranteed-release cleanup, regardless of which branch above
            // ended the loop.
            registry.remove(&registered, &subscriber);
        });

        Ok(Response::new(
            Box::pin(ReceiverStream::new(outbound_rx)) as Self::Candlesticks1MStreamStream
        ))
    }
}
