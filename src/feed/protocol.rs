// Deriv Wire Protocol - request builders and inbound frame classification
// Every frame is a JSON text message; numeric fields may arrive as strings

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::types::{Candle, Tick, Timeframe};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed {context} frame: {reason}")]
    Malformed {
        context: &'static str,
        reason: String,
    },
}

// ============================================================================
// Outbound requests
// ============================================================================

/// Subscribe to the live tick stream for one symbol.
pub fn tick_subscribe_request(symbol: &str) -> String {
    serde_json::json!({
        "ticks": symbol,
        "subscribe": 1
    })
    .to_string()
}

/// One-shot request for the most recent `count` candles.
#[derive(Debug, Clone, Serialize)]
pub struct TicksHistoryRequest {
    pub ticks_history: String,
    pub adjust_start_time: u8,
    pub count: usize,
    pub end: String,
    pub granularity: i64,
    pub style: String,
}

impl TicksHistoryRequest {
    pub fn new(symbol: &str, timeframe: Timeframe, count: usize) -> Self {
        Self {
            ticks_history: symbol.to_string(),
            adjust_start_time: 1,
            count,
            end: "latest".to_string(),
            granularity: timeframe.granularity(),
            style: "candles".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Inbound frames
// ============================================================================

/// Classified inbound frame. Frames the pipeline does not consume (subscription
/// acks, ping responses) classify as `Other` and are skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Tick(Tick),
    History(Vec<Candle>),
    Error { code: String, message: String },
    Other,
}

// The feed sends numbers as JSON strings in candle payloads.
fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("non-finite number")),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("bad numeric string: {}", e))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct TickPayload {
    symbol: String,
    epoch: i64,
    #[serde(deserialize_with = "flexible_f64")]
    quote: f64,
}

#[derive(Debug, Deserialize)]
struct CandlePayload {
    epoch: i64,
    #[serde(deserialize_with = "flexible_f64")]
    open: f64,
    #[serde(deserialize_with = "flexible_f64")]
    high: f64,
    #[serde(deserialize_with = "flexible_f64")]
    low: f64,
    #[serde(deserialize_with = "flexible_f64")]
    close: f64,
}

impl From<CandlePayload> for Candle {
    fn from(payload: CandlePayload) -> Self {
        Candle {
            time: payload.epoch,
            open: payload.open,
            high: payload.high,
            low: payload.low,
            close: payload.close,
        }
    }
}

/// Classify one raw text frame. Unknown or irrelevant frames return
/// `InboundMessage::Other` rather than an error, so protocol growth upstream
/// never breaks the read loop.
pub fn parse_message(text: &str) -> Result<InboundMessage, ParseError> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(error) = value.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Ok(InboundMessage::Error { code, message });
    }

    if let Some(tick) = value.get("tick") {
        let payload: TickPayload =
            serde_json::from_value(tick.clone()).map_err(|e| ParseError::Malformed {
                context: "tick",
                reason: e.to_string(),
            })?;
        return Ok(InboundMessage::Tick(Tick::new(
            payload.symbol,
            payload.epoch,
            payload.quote,
        )));
    }

    if let Some(candles) = value.get("candles") {
        let payloads: Vec<CandlePayload> =
            serde_json::from_value(candles.clone()).map_err(|e| ParseError::Malformed {
                context: "candles",
                reason: e.to_string(),
            })?;
        return Ok(InboundMessage::History(
            payloads.into_iter().map(Candle::from).collect(),
        ));
    }

    Ok(InboundMessage::Other)
}
