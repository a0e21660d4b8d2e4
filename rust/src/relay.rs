use std::fmt;

use crate::error::SubmitError;
use crate::submit::SignedPayload;
use crate::BoxFuture;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayErrorKind {
    /// The ledger refused the transaction (bad sequence, insufficient fee, ...).
    Rejected,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayError {
    pub kind: RelayErrorKind,
    pub message: String,
}

impl RelayError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: RelayErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: RelayErrorKind::Unavailable,
            message: message.into(),
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl std::error::Error for RelayError {}

impl From<RelayError> for SubmitError {
    fn from(err: RelayError) -> Self {
        match err.kind {
            RelayErrorKind::Rejected => SubmitError::RelayRejected(err.message),
            RelayErrorKind::Unavailable => SubmitError::RelayUnavailable(err.message),
        }
    }
}

/// Network relay that submits signed transactions to the ledger.
pub trait Relay: Send + Sync + 'static {
    fn send<'a>(
        &'a self,
        signed: &'a SignedPayload,
    ) -> BoxFuture<'a, Result<SubmissionReceipt, RelayError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_errors_keep_their_message() {
        let err: SubmitError = RelayError::rejected("tx_insufficient_fee").into();
        assert_eq!(
            err,
            SubmitError::RelayRejected("tx_insufficient_fee".to_string())
        );

        let err: SubmitError = RelayError::unavailable("connection reset").into();
        assert_eq!(err.to_string(), "relay unavailable: connection reset");
    }
}
