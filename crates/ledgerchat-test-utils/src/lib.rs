//! In-memory stand-ins for the collaborators a chat session talks to, plus
//! helpers that encode ledger values the way the real sources deliver them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use chrono::{TimeZone, Utc};
use ledgerchat_core::{
    BoxFuture, HistorySource, LedgerRpc, LedgerWindow, RawRecord, RawValue, Relay, RelayError,
    SignedPayload, SignerError, SubmissionReceipt, SyncError, UnsignedPayload, WalletSigner,
};
use stellar_xdr::curr::{Hash, Limits, ScAddress, ScString, ScVal, WriteXdr};
use tokio::sync::Notify;

pub fn encode_scval(val: &ScVal) -> String {
    let bytes = val.to_xdr(Limits::none()).expect("encode scval");
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Topic naming a contract sender derived from `seed`.
pub fn contract_topic(seed: u8) -> String {
    encode_scval(&ScVal::Address(ScAddress::Contract(Hash([seed; 32]))))
}

pub fn xdr_string(text: &str) -> String {
    encode_scval(&ScVal::String(ScString(
        text.try_into().expect("string fits in ScString"),
    )))
}

fn rfc3339(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .expect("valid timestamp")
        .to_rfc3339()
}

/// A record shaped like a ledger RPC event.
pub fn rpc_record(id: &str, ledger: u32, secs: i64, body: &str) -> RawRecord {
    RawRecord {
        id: id.to_string(),
        ledger: Some(ledger),
        topics: vec![contract_topic(1)],
        value: RawValue::Xdr(xdr_string(body)),
        closed_at: rfc3339(secs),
        transaction_hash: format!("tx-{id}"),
    }
}

/// A record shaped like a historical query row.
pub fn history_record(id: &str, secs: i64, body: &str) -> RawRecord {
    let closed_at = Utc
        .timestamp_opt(secs, 0)
        .single()
        .expect("valid timestamp")
        .format("%Y-%m-%d %H:%M:%S%.6f UTC")
        .to_string();
    RawRecord {
        id: id.to_string(),
        ledger: None,
        topics: vec![contract_topic(1)],
        value: RawValue::Text(body.to_string()),
        closed_at,
        transaction_hash: format!("tx-{id}"),
    }
}

/// A record whose topic will not decode.
pub fn corrupt_record(id: &str) -> RawRecord {
    RawRecord {
        id: id.to_string(),
        ledger: None,
        topics: vec!["@@not-base64@@".to_string()],
        value: RawValue::Text(String::new()),
        closed_at: rfc3339(0),
        transaction_hash: String::new(),
    }
}

pub struct FakeHistory {
    response: Mutex<Result<Vec<RawRecord>, SyncError>>,
    calls: AtomicUsize,
}

impl FakeHistory {
    pub fn new(records: Vec<RawRecord>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(records)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Err(SyncError::unavailable(msg))),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HistorySource for FakeHistory {
    fn fetch_records(&self) -> BoxFuture<'_, Result<Vec<RawRecord>, SyncError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response.lock().unwrap().clone();
        Box::pin(async move { response })
    }
}

/// Ledger RPC with a settable head and a queue of `get_events` responses.
///
/// Once the queue is empty every poll returns no events.
pub struct FakeLedgerRpc {
    head: AtomicU32,
    head_failures: AtomicUsize,
    responses: Mutex<VecDeque<Result<Vec<RawRecord>, SyncError>>>,
    windows: Mutex<Vec<LedgerWindow>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeLedgerRpc {
    pub fn new(head: u32) -> Arc<Self> {
        Arc::new(Self {
            head: AtomicU32::new(head),
            head_failures: AtomicUsize::new(0),
            responses: Mutex::new(VecDeque::new()),
            windows: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        })
    }

    pub fn set_head(&self, head: u32) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Make the next `n` head lookups fail.
    pub fn fail_head(&self, n: usize) {
        self.head_failures.store(n, Ordering::SeqCst);
    }

    pub fn push_events(&self, records: Vec<RawRecord>) {
        self.responses.lock().unwrap().push_back(Ok(records));
    }

    pub fn push_failure(&self, msg: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(SyncError::unavailable(msg)));
    }

    /// Hold every `get_events` call until the returned notify fires.
    pub fn hold_events(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requested_windows(&self) -> Vec<LedgerWindow> {
        self.windows.lock().unwrap().clone()
    }
}

impl LedgerRpc for FakeLedgerRpc {
    fn latest_ledger_sequence(&self) -> BoxFuture<'_, Result<u32, SyncError>> {
        let failing = self
            .head_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let head = self.head.load(Ordering::SeqCst);
        Box::pin(async move {
            if failing {
                Err(SyncError::unavailable("rpc head lookup failed"))
            } else {
                Ok(head)
            }
        })
    }

    fn get_events(
        &self,
        window: LedgerWindow,
    ) -> BoxFuture<'_, Result<Vec<RawRecord>, SyncError>> {
        self.windows.lock().unwrap().push(window);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        let gate = self.gate.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            response
        })
    }
}

/// Wallet signer that records calls and returns a configurable outcome.
pub struct FakeSigner {
    calls: AtomicUsize,
    failure: Mutex<Option<SignerError>>,
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Notify,
    last_key: Mutex<Option<String>>,
}

impl FakeSigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            gate: Mutex::new(None),
            entered: Notify::new(),
            last_key: Mutex::new(None),
        })
    }

    pub fn fail_with(&self, err: SignerError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Block signing until the returned notify fires.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release_hold(&self) {
        *self.gate.lock().unwrap() = None;
    }

    /// Resolves once a `sign` call has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_key(&self) -> Option<String> {
        self.last_key.lock().unwrap().clone()
    }
}

impl WalletSigner for FakeSigner {
    fn sign<'a>(
        &'a self,
        payload: &'a UnsignedPayload,
        key_reference: &'a str,
    ) -> BoxFuture<'a, Result<SignedPayload, SignerError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().unwrap() = Some(key_reference.to_string());
        self.entered.notify_one();
        let failure = self.failure.lock().unwrap().clone();
        let gate = self.gate.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            match failure {
                Some(err) => Err(err),
                None => Ok(SignedPayload {
                    envelope: format!(
                        "signed:{}:{}:{}:{}",
                        payload.contract_id, payload.function, payload.addr, payload.body
                    ),
                }),
            }
        })
    }
}

pub struct FakeRelay {
    sent: Mutex<Vec<SignedPayload>>,
    failure: Mutex<Option<RelayError>>,
}

impl FakeRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        })
    }

    pub fn fail_with(&self, err: RelayError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn sent(&self) -> Vec<SignedPayload> {
        self.sent.lock().unwrap().clone()
    }
}

impl Relay for FakeRelay {
    fn send<'a>(
        &'a self,
        signed: &'a SignedPayload,
    ) -> BoxFuture<'a, Result<SubmissionReceipt, RelayError>> {
        let failure = self.failure.lock().unwrap().clone();
        let result = match failure {
            Some(err) => Err(err),
            None => {
                let mut sent = self.sent.lock().unwrap();
                sent.push(signed.clone());
                Ok(SubmissionReceipt {
                    transaction_hash: format!("hash-{}", sent.len()),
                })
            }
        };
        Box::pin(async move { result })
    }
}
