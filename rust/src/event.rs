//! Chat events and the normalization shared by both fetch sources.
//!
//! The historical query service and the ledger RPC hand back records with the
//! same shape: an opaque XDR-encoded topic naming the sender, a value carrying
//! the message, and the close time of the ledger. Both paths go through
//! [`normalize_batch`] so an event looks identical whichever source saw it.

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use stellar_xdr::curr::{
    AccountId, Hash, Limits, PublicKey, ReadXdr, ScAddress, ScVal, Uint256,
};

use crate::error::DecodeError;

/// One chat message recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Stable across both sources; the dedup key.
    pub id: String,
    pub sender: String,
    /// Close time of the ledger that finalized the message; the ordering key.
    pub timestamp: DateTime<Utc>,
    pub transaction_ref: String,
    pub body: String,
    /// Ledger sequence, when the source reports it.
    pub ledger: Option<u32>,
}

impl Event {
    /// `GABCD...WXYZ` style truncation of the sender for compact display.
    pub fn short_sender(&self, keep: usize) -> String {
        let chars: Vec<char> = self.sender.chars().collect();
        if keep == 0 || chars.len() <= keep.saturating_mul(2) {
            return self.sender.clone();
        }
        let head: String = chars[..keep].iter().collect();
        let tail: String = chars[chars.len() - keep..].iter().collect();
        format!("{head}...{tail}")
    }

    pub fn explorer_url(&self, base: &str) -> String {
        if base.ends_with('/') {
            format!("{base}{}", self.transaction_ref)
        } else {
            format!("{base}/{}", self.transaction_ref)
        }
    }
}

/// How a record carries its message value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Base64 XDR `ScVal`, as the ledger RPC returns it.
    Xdr(String),
    /// Already decoded by the source.
    Text(String),
}

/// A record as delivered by either source, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: String,
    pub ledger: Option<u32>,
    /// Base64 XDR `ScVal`s; the first one names the sender.
    pub topics: Vec<String>,
    pub value: RawValue,
    pub closed_at: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub id: String,
    pub error: DecodeError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub events: Vec<Event>,
    pub rejected: Vec<RejectedRecord>,
}

pub fn normalize_record(raw: &RawRecord) -> Result<Event, DecodeError> {
    let topic = raw.topics.first().ok_or(DecodeError::MissingTopic)?;
    let sender = sender_from_scval(decode_scval(topic)?)?;
    let body = match &raw.value {
        RawValue::Text(text) => text.clone(),
        RawValue::Xdr(encoded) => body_from_scval(decode_scval(encoded)?)?,
    };
    let timestamp = parse_closed_at(&raw.closed_at)?;

    Ok(Event {
        id: raw.id.clone(),
        sender,
        timestamp,
        transaction_ref: raw.transaction_hash.clone(),
        body,
        ledger: raw.ledger,
    })
}

/// Decode every record, keeping the ones that fail aside instead of failing the batch.
pub fn normalize_batch(records: impl IntoIterator<Item = RawRecord>) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for raw in records {
        match normalize_record(&raw) {
            Ok(event) => batch.events.push(event),
            Err(error) => {
                tracing::debug!(id = %raw.id, %error, "record dropped");
                batch.rejected.push(RejectedRecord { id: raw.id, error });
            }
        }
    }
    batch
}

fn decode_scval(encoded: &str) -> Result<ScVal, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    ScVal::from_xdr(bytes, Limits::none()).map_err(|e| DecodeError::InvalidXdr(e.to_string()))
}

fn sender_from_scval(val: ScVal) -> Result<String, DecodeError> {
    match val {
        ScVal::Address(ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(
            Uint256(key),
        )))) => Ok(stellar_strkey::ed25519::PublicKey(key).to_string()),
        ScVal::Address(ScAddress::Contract(Hash(contract))) => {
            Ok(stellar_strkey::Contract(contract).to_string())
        }
        ScVal::Symbol(sym) => utf8(sym.0.as_vec(), "topic"),
        ScVal::String(s) => utf8(s.0.as_vec(), "topic"),
        other => Err(DecodeError::UnsupportedTopic(format!(
            "{:?}",
            other.discriminant()
        ))),
    }
}

fn body_from_scval(val: ScVal) -> Result<String, DecodeError> {
    match val {
        ScVal::String(s) => utf8(s.0.as_vec(), "value"),
        ScVal::Symbol(sym) => utf8(sym.0.as_vec(), "value"),
        ScVal::Bytes(bytes) => utf8(bytes.0.as_vec(), "value"),
        other => Err(DecodeError::UnsupportedValue(format!(
            "{:?}",
            other.discriminant()
        ))),
    }
}

fn utf8(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8(field))
}

/// Accepts RFC 3339 (ledger RPC) and `2024-12-17 22:19:36.000000 UTC` (query service).
pub(crate) fn parse_closed_at(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = trimmed
        .strip_suffix("UTC")
        .map(str::trim_end)
        .unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S"))
        .map(|n| Utc.from_utc_datetime(&n))
        .map_err(|_| DecodeError::InvalidTimestamp(raw.to_string()))
}
