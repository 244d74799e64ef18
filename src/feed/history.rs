// History Client - one-shot candle backfill over a dedicated connection
// Concurrent requests for the same (symbol, timeframe) share one in-flight
// fetch; the dedup entry is removed inside the shared future so cleanup
// happens on every exit path, success or failure

use futures::future::{BoxFuture, FutureExt, Shared};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::core::types::{Candle, Timeframe};
use crate::feed::protocol::{parse_message, InboundMessage, TicksHistoryRequest};

/// Cloneable so every awaiter of a shared fetch can receive the same failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HistoryError {
    #[error("History request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Feed rejected request: {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("Connection closed before a response arrived")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HistoryKey {
    symbol: String,
    timeframe: Timeframe,
    count: usize,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Vec<Candle>, HistoryError>>>;

/// Fetches recent candle history on demand. Each fetch opens its own
/// short-lived websocket connection so backfills never contend with the live
/// tick stream.
pub struct HistoryClient {
    endpoint: String,
    timeout: Duration,
    inflight: Arc<Mutex<HashMap<HistoryKey, SharedFetch>>>,
}

impl HistoryClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the most recent `count` candles, newest last. A second caller
    /// arriving while the same (symbol, timeframe, count) fetch is in flight
    /// awaits the same future instead of opening another connection.
    pub async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, HistoryError> {
        let key = HistoryKey {
            symbol: symbol.to_string(),
            timeframe,
            count,
        };

        let fetch = {
            let mut inflight = self.inflight.lock();
            if let Some(existing) = inflight.get(&key) {
                debug!(symbol = %symbol, timeframe = %timeframe, count = count, "Joining in-flight history fetch");
                existing.clone()
            } else {
                let endpoint = self.endpoint.clone();
                let timeout = self.timeout;
                let request = TicksHistoryRequest::new(symbol, timeframe, count);
                let map = self.inflight.clone();
                let cleanup_key = key.clone();

                let fetch = async move {
                    let result =
                        match tokio::time::timeout(timeout, fetch_once(&endpoint, &request)).await
                        {
                            Ok(inner) => inner,
                            Err(_) => Err(HistoryError::Timeout),
                        };
                    map.lock().remove(&cleanup_key);
                    result
                }
                .boxed()
                .shared();

                inflight.insert(key, fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    /// Number of fetches currently in flight.
    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// One connection, one request, one response.
async fn fetch_once(
    endpoint: &str,
    request: &TicksHistoryRequest,
) -> Result<Vec<Candle>, HistoryError> {
    let (ws_stream, _) = connect_async(endpoint)
        .await
        .map_err(|e| HistoryError::Connect(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let payload = request
        .to_json()
        .map_err(|e| HistoryError::Protocol(e.to_string()))?;
    write
        .send(Message::Text(payload.into()))
        .await
        .map_err(|e| HistoryError::Connect(e.to_string()))?;

    while let Some(frame) = read.next().await {
        let frame = frame.map_err(|e| HistoryError::Connect(e.to_string()))?;
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => return Err(HistoryError::Closed),
            _ => continue,
        };

        match parse_message(text.as_str()).map_err(|e| HistoryError::Protocol(e.to_string()))? {
            InboundMessage::History(candles) => {
                info!(
                    symbol = %request.ticks_history,
                    count = candles.len(),
                    "History received"
                );
                return Ok(candles);
            }
            InboundMessage::Error { code, message } => {
                warn!(symbol = %request.ticks_history, code = %code, "History request rejected");
                return Err(HistoryError::Rejected { code, message });
            }
            // Acks and unrelated frames on this connection are skipped
            _ => continue,
        }
    }

    Err(HistoryError::Closed)
}
