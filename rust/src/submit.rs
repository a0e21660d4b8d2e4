//! Outgoing messages: build, sign, relay, one at a time.
//!
//! The pipeline only gets a transaction onto the ledger. Whether the message
//! shows up is observed later by the poller once the ledger closes and the
//! event is indexed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::error::SubmitError;
use crate::relay::{Relay, SubmissionReceipt};
use crate::signer::WalletSigner;

/// What the caller wants to send. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    /// The poster's wallet contract, passed to the chat contract as `addr`.
    pub recipient_contract: Option<String>,
    pub body: String,
    pub key_reference: Option<String>,
}

/// Contract invocation handed to the wallet for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsignedPayload {
    /// The chat contract being invoked.
    pub contract_id: String,
    pub function: String,
    pub addr: String,
    pub body: String,
}

/// Opaque signed envelope produced by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub envelope: String,
}

/// `Failed` stays published until the next submission starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    Idle,
    Building,
    Signing,
    Relaying,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltMessage {
    pub payload: UnsignedPayload,
    pub key_reference: String,
}

#[derive(Debug, Clone)]
pub struct ContractCallBuilder {
    chat_contract: String,
    function: String,
}

impl ContractCallBuilder {
    pub fn new(chat_contract: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            chat_contract: chat_contract.into(),
            function: function.into(),
        }
    }

    /// Fails before any wallet interaction if the draft is missing its target or key.
    pub fn build(&self, draft: Draft) -> Result<BuiltMessage, SubmitError> {
        let contract_id = non_blank(Some(self.chat_contract.clone()))
            .ok_or_else(|| SubmitError::InvalidDraft("chat contract not configured".into()))?;
        let addr = non_blank(draft.recipient_contract)
            .ok_or_else(|| SubmitError::InvalidDraft("missing recipient contract".into()))?;
        let key_reference = non_blank(draft.key_reference)
            .ok_or_else(|| SubmitError::InvalidDraft("missing key reference".into()))?;

        Ok(BuiltMessage {
            payload: UnsignedPayload {
                contract_id,
                function: self.function.clone(),
                addr,
                body: draft.body,
            },
            key_reference,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Session-wide "is sending" flag.
#[derive(Debug, Clone, Default)]
pub struct SendGuard {
    in_flight: Arc<AtomicBool>,
}

impl SendGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// `None` while another permit is alive.
    pub fn try_acquire(&self) -> Option<SendPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SendPermit {
                in_flight: self.in_flight.clone(),
            })
    }
}

/// Releases the [`SendGuard`] when dropped.
#[must_use]
#[derive(Debug)]
pub struct SendPermit {
    in_flight: Arc<AtomicBool>,
}

impl Drop for SendPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

// Returns the observable stage to `Idle` on every way out of `submit`,
// including the caller dropping the future mid-sign. A `Failed` stage is left
// in place for observers.
struct InFlight<'a> {
    _permit: SendPermit,
    stage: &'a watch::Sender<SubmitStage>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stage.send_if_modified(|stage| match stage {
            SubmitStage::Idle | SubmitStage::Failed => false,
            _ => {
                *stage = SubmitStage::Idle;
                true
            }
        });
    }
}

pub struct SubmitPipeline {
    builder: ContractCallBuilder,
    signer: Arc<dyn WalletSigner>,
    relay: Arc<dyn Relay>,
    guard: SendGuard,
    stage: watch::Sender<SubmitStage>,
}

impl std::fmt::Debug for SubmitPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitPipeline")
            .field("builder", &self.builder)
            .field("guard", &self.guard)
            .field("stage", &*self.stage.borrow())
            .finish_non_exhaustive()
    }
}

impl SubmitPipeline {
    pub fn new(
        builder: ContractCallBuilder,
        signer: Arc<dyn WalletSigner>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        let (stage, _rx) = watch::channel(SubmitStage::Idle);
        Self {
            builder,
            signer,
            relay,
            guard: SendGuard::new(),
            stage,
        }
    }

    pub fn guard(&self) -> &SendGuard {
        &self.guard
    }

    pub fn stage(&self) -> SubmitStage {
        *self.stage.borrow()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<SubmitStage> {
        self.stage.subscribe()
    }

    /// Run one submission. A call made while another is in flight fails with
    /// [`SubmitError::AlreadyInFlight`] without touching the wallet.
    pub async fn submit(&self, draft: Draft) -> Result<SubmissionReceipt, SubmitError> {
        let Some(permit) = self.guard.try_acquire() else {
            tracing::debug!("submit rejected: already in flight");
            return Err(SubmitError::AlreadyInFlight);
        };
        let _in_flight = InFlight {
            _permit: permit,
            stage: &self.stage,
        };

        let result = self.run(draft).await;
        if let Err(err) = &result {
            let stage = self.stage.send_replace(SubmitStage::Failed);
            tracing::warn!(?stage, %err, "submit failed");
        } else {
            self.stage.send_replace(SubmitStage::Idle);
        }
        result
    }

    async fn run(&self, draft: Draft) -> Result<SubmissionReceipt, SubmitError> {
        self.stage.send_replace(SubmitStage::Building);
        let built = self.builder.build(draft)?;
        tracing::debug!(
            contract = %built.payload.contract_id,
            function = %built.payload.function,
            "unsigned payload built"
        );

        self.stage.send_replace(SubmitStage::Signing);
        let signed = self
            .signer
            .sign(&built.payload, &built.key_reference)
            .await?;

        self.stage.send_replace(SubmitStage::Relaying);
        let receipt = self.relay.send(&signed).await?;
        tracing::info!(tx = %receipt.transaction_hash, "message submitted");
        Ok(receipt)
    }
}
