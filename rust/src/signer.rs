use std::fmt;

use crate::error::SubmitError;
use crate::submit::{SignedPayload, UnsignedPayload};
use crate::BoxFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerErrorKind {
    Rejected,
    Canceled,
    KeyNotFound,
    Timeout,
    Unavailable,
    InvalidResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerError {
    pub kind: SignerErrorKind,
    pub message: String,
}

impl SignerError {
    pub fn new(kind: SignerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn prefix(&self) -> &'static str {
        match self.kind {
            SignerErrorKind::Rejected => "rejected",
            SignerErrorKind::Canceled => "canceled",
            SignerErrorKind::KeyNotFound => "key not found",
            SignerErrorKind::Timeout => "timeout",
            SignerErrorKind::Unavailable => "signer unavailable",
            SignerErrorKind::InvalidResponse => "invalid response",
        }
    }
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.trim().is_empty() {
            f.write_str(self.prefix())
        } else {
            write!(f, "{}: {}", self.prefix(), self.message)
        }
    }
}

impl std::error::Error for SignerError {}

impl From<SignerError> for SubmitError {
    fn from(err: SignerError) -> Self {
        match err.kind {
            // The user (or the device on their behalf) said no.
            SignerErrorKind::Rejected | SignerErrorKind::Canceled | SignerErrorKind::KeyNotFound => {
                SubmitError::SigningRejected(err.to_string())
            }
            SignerErrorKind::Timeout
            | SignerErrorKind::Unavailable
            | SignerErrorKind::InvalidResponse => SubmitError::SigningUnavailable(err.to_string()),
        }
    }
}

/// External wallet that resolves a key reference and signs with it.
pub trait WalletSigner: Send + Sync + 'static {
    fn sign<'a>(
        &'a self,
        payload: &'a UnsignedPayload,
        key_reference: &'a str,
    ) -> BoxFuture<'a, Result<SignedPayload, SignerError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declines_map_to_signing_rejected() {
        for kind in [
            SignerErrorKind::Rejected,
            SignerErrorKind::Canceled,
            SignerErrorKind::KeyNotFound,
        ] {
            let err: SubmitError = SignerError::new(kind, "nope").into();
            assert!(matches!(err, SubmitError::SigningRejected(_)), "{kind:?}");
        }
    }

    #[test]
    fn device_failures_map_to_signing_unavailable() {
        for kind in [
            SignerErrorKind::Timeout,
            SignerErrorKind::Unavailable,
            SignerErrorKind::InvalidResponse,
        ] {
            let err: SubmitError = SignerError::new(kind, "").into();
            assert!(matches!(err, SubmitError::SigningUnavailable(_)), "{kind:?}");
        }
    }

    #[test]
    fn display_uses_prefix_when_message_blank() {
        assert_eq!(
            SignerError::new(SignerErrorKind::Timeout, "  ").to_string(),
            "timeout"
        );
        assert_eq!(
            SignerError::new(SignerErrorKind::Rejected, "user dismissed prompt").to_string(),
            "rejected: user dismissed prompt"
        );
    }
}
