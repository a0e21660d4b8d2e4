//! Payload shapes of the historical query service and the ledger RPC.
//!
//! Transport lives with the collaborators; this module only turns response
//! bodies into [`RawRecord`]s. A body that does not have the expected shape is
//! a fetch-level failure, not a per-record one.

use serde::Deserialize;

use crate::error::SyncError;
use crate::event::{RawRecord, RawValue};

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    data: Option<HistoryData>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    records: Vec<HistoryRecord>,
}

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    id: String,
    topic: String,
    #[serde(default)]
    value: String,
    ledger_closed_at: String,
    transaction_hash: String,
}

impl From<HistoryRecord> for RawRecord {
    fn from(r: HistoryRecord) -> Self {
        RawRecord {
            id: r.id,
            ledger: None,
            topics: vec![r.topic],
            // The query service decodes values server side.
            value: RawValue::Text(r.value),
            closed_at: r.ledger_closed_at,
            transaction_hash: r.transaction_hash,
        }
    }
}

/// Parse a historical query response body.
pub fn parse_history_response(body: &[u8]) -> Result<Vec<RawRecord>, SyncError> {
    let resp: HistoryResponse = serde_json::from_slice(body)
        .map_err(|e| SyncError::unavailable(format!("malformed history payload: {e}")))?;
    if !resp.errors.is_empty() {
        return Err(SyncError::unavailable(format!(
            "history query failed: {}",
            serde_json::Value::Array(resp.errors)
        )));
    }
    let data = resp
        .data
        .ok_or_else(|| SyncError::unavailable("history payload has no data"))?;
    Ok(data.records.into_iter().map(RawRecord::from).collect())
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// `getEvents` result.
#[derive(Debug, Deserialize)]
pub struct EventsPage {
    #[serde(default)]
    events: Vec<RpcEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcEvent {
    id: String,
    ledger: u32,
    ledger_closed_at: String,
    #[serde(default)]
    tx_hash: String,
    #[serde(default)]
    topic: Vec<String>,
    value: RpcValue,
}

// Older RPC servers wrap the value as `{"xdr": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcValue {
    Plain(String),
    Wrapped { xdr: String },
}

impl From<RpcEvent> for RawRecord {
    fn from(e: RpcEvent) -> Self {
        let value = match e.value {
            RpcValue::Plain(xdr) | RpcValue::Wrapped { xdr } => xdr,
        };
        RawRecord {
            id: e.id,
            ledger: Some(e.ledger),
            topics: e.topic,
            value: RawValue::Xdr(value),
            closed_at: e.ledger_closed_at,
            transaction_hash: e.tx_hash,
        }
    }
}

impl EventsPage {
    pub fn into_records(self) -> Vec<RawRecord> {
        self.events.into_iter().map(RawRecord::from).collect()
    }
}

/// Parse a `getEvents` body, either bare or inside a JSON-RPC envelope.
pub fn parse_events_response(body: &[u8]) -> Result<EventsPage, SyncError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| SyncError::unavailable(format!("malformed events payload: {e}")))?;
    let is_envelope = value.get("result").is_some() || value.get("error").is_some();
    if !is_envelope {
        return serde_json::from_value(value)
            .map_err(|e| SyncError::unavailable(format!("malformed events payload: {e}")));
    }

    let envelope: RpcEnvelope<EventsPage> = serde_json::from_value(value)
        .map_err(|e| SyncError::unavailable(format!("malformed events payload: {e}")))?;
    if let Some(err) = envelope.error {
        return Err(SyncError::unavailable(format!(
            "rpc error {}: {}",
            err.code, err.message
        )));
    }
    envelope
        .result
        .ok_or_else(|| SyncError::unavailable("rpc response has no result"))
}
