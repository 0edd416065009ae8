use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::domain::{Symbol, TradeEvent};
use crate::error::UpstreamError;
use crate::upstream::UpstreamAdapter;

/// Base URL for Binance's combined aggregated-trade stream.
pub const STREAM_BASE_URL: &str = "wss://stream.binance.com:443";

/// Buffer for the inbound event channel: absorbs bursts from the
/// exchange without growing unbounded; the aggregator's ingress loop
/// applies backpressure once it falls behind.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Wraps the exchange websocket; produces a typed event channel and
/// honors cancellation. Reconnection is out of scope (see the design
/// notes on the upstream reconnection gap) — a dropped connection simply
/// closes the event channel.
pub struct BinanceAdapter;

impl BinanceAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UpstreamAdapter for BinanceAdapter {
    /// Opens the combined-stream connection for `symbols` and spawns the
    /// receive loop. Failure to establish the initial connection is
    /// fatal and returned here; once connected, a terminal error instead
    /// invokes `on_error` and closes the returned channel.
    async fn connect(
        &self,
        symbols: &[Symbol],
        on_error: Box<dyn Fn(UpstreamError) + Send + 'static>,
        done: CancellationToken,
    ) -> Result<async_channel::Receiver<TradeEvent>, UpstreamError> {
        let url = combined_stream_url(symbols);
        tracing::info!(%url, "connecting to upstream aggregated-trade stream");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        let (event_tx, event_rx) = async_channel::bounded(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(receive_loop(ws_stream, event_tx, on_error, done));

        Ok(event_rx)
    }
}

fn combined_stream_url(symbols: &[Symbol]) -> String {
    let streams = symbols
        .iter()
        .map(|s| format!("{}@aggTrade", s.as_str().to_lowercase()))
        .collect::<Vec<_>>()
        .join("/");
    format!("{STREAM_BASE_URL}/stream?streams={streams}")
}

async fn receive_loop(
    mut ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    event_tx: async_channel::Sender<TradeEvent>,
    on_error: Box<dyn Fn(UpstreamError) + Send + 'static>,
    done: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = done.cancelled() => {
                tracing::debug!("upstream adapter received shutdown signal");
                let _ = ws.close(None).await;
                break;
            }
            message = ws.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match decode_event(&text) {
                        Ok(Some(event)) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => tracing::warn!(error = %err, "dropping malformed upstream message"),
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        let err = UpstreamError::Disconnected("upstream closed the connection".into());
                        tracing::error!(error = %err, "upstream stream ended");
                        on_error(err);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let err = UpstreamError::Disconnected(e.to_string());
                        tracing::error!(error = %err, "upstream websocket error");
                        on_error(err);
                        break;
                    }
                }
            }
        }
    }
    // Sole producer: closes the event channel for every downstream consumer.
    drop(event_tx);
}

#[derive(Debug, Deserialize)]
struct CombinedEnvelope {
    data: AggTradePayload,
}

#[derive(Debug, Deserialize)]
struct AggTradePayload {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "T")]
    trade_time_ms: i64,
}

fn decode_event(text: &str) -> Result<Option<TradeEvent>, UpstreamError> {
    let envelope: CombinedEnvelope = serde_json::from_str(text)?;
    if envelope.data.event_type != "aggTrade" {
        return Ok(None);
    }
    let symbol = match Symbol::parse(&envelope.data.symbol) {
        Ok(symbol) => symbol,
        Err(_) => return Err(UpstreamError::InvalidSymbol(envelope.data.symbol)),
    };
    Ok(Some(TradeEvent {
        symbol,
        price: envelope.data.price,
        trade_time: envelope.data.trade_time_ms.div_euclid(1000),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_combined_stream_url_for_multiple_symbols() {
        let symbols = vec![Symbol::parse("ETHBTC").unwrap(), Symbol::parse("BNBBTC").unwrap()];
        let url = combined_stream_url(&symbols);
        assert_eq!(
            url,
            "wss://stream.binance.com:443/stream?streams=ethbtc@aggTrade/bnbbtc@aggTrade"
        );
    }

    #[test]
    fn decodes_agg_trade_payload() {
        let text = r#"{"stream":"ethbtc@aggTrade","data":{"e":"aggTrade","E":1737734701000,"s":"ETHBTC","p":"0.11111","T":1737734701123}}"#;
        let event = decode_event(text).unwrap().unwrap();
        assert_eq!(event.symbol.as_str(), "ETHBTC");
        assert_eq!(event.price, "0.11111");
        assert_eq!(event.trade_time, 1737734701);
    }

    #[test]
    fn ignores_non_agg_trade_payloads() {
        let text = r#"{"stream":"ethbtc@depth","data":{"e":"depthUpdate","s":"ETHBTC","p":"0","T":0}}"#;
        assert!(decode_event(text).unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode_event("not json").is_err());
    }
}
