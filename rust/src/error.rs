//! Error types for the sync engine and the submit pipeline.

use thiserror::Error;

/// Why a single raw record could not be turned into an [`crate::Event`].
///
/// These never abort a batch: the record is dropped, counted and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record has no topic")]
    MissingTopic,

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("invalid xdr: {0}")]
    InvalidXdr(String),

    #[error("unsupported topic value: {0}")]
    UnsupportedTopic(String),

    #[error("unsupported message value: {0}")]
    UnsupportedValue(String),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Fetch-level failure of the historical query service or the ledger RPC.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Transport, auth, or a payload that does not have the expected shape.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
}

impl SyncError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }
}

/// Coarse classification of a submit failure, for picking what to tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The draft itself was incomplete.
    Input,
    /// The user or the signing device declined.
    Declined,
    /// Wallet device or network transport problem.
    Network,
    /// The ledger refused the transaction.
    Ledger,
    /// Another submission is still in flight.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("invalid draft: {0}")]
    InvalidDraft(String),

    #[error("signing rejected: {0}")]
    SigningRejected(String),

    #[error("signer unavailable: {0}")]
    SigningUnavailable(String),

    #[error("relay rejected: {0}")]
    RelayRejected(String),

    #[error("relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("a message is already being sent")]
    AlreadyInFlight,
}

impl SubmitError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::InvalidDraft(_) => FailureClass::Input,
            Self::SigningRejected(_) => FailureClass::Declined,
            Self::SigningUnavailable(_) | Self::RelayUnavailable(_) => FailureClass::Network,
            Self::RelayRejected(_) => FailureClass::Ledger,
            Self::AlreadyInFlight => FailureClass::Busy,
        }
    }

    pub fn user_visible_message(&self) -> &'static str {
        match self.failure_class() {
            FailureClass::Input => "Log in before sending a message",
            FailureClass::Declined => "Signing request declined",
            FailureClass::Network => "Network problem, try again",
            FailureClass::Ledger => "Message rejected by the ledger",
            FailureClass::Busy => "Still sending the previous message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_error_display() {
        let err = SubmitError::SigningRejected("user canceled".to_string());
        assert_eq!(err.to_string(), "signing rejected: user canceled");

        let err = SubmitError::AlreadyInFlight;
        assert_eq!(err.to_string(), "a message is already being sent");
    }

    #[test]
    fn failure_classes_distinguish_declined_network_and_ledger() {
        let declined = SubmitError::SigningRejected("no".into());
        let network = SubmitError::RelayUnavailable("timeout".into());
        let ledger = SubmitError::RelayRejected("tx_bad_seq".into());

        assert_eq!(declined.failure_class(), FailureClass::Declined);
        assert_eq!(network.failure_class(), FailureClass::Network);
        assert_eq!(ledger.failure_class(), FailureClass::Ledger);
        assert_ne!(declined.user_visible_message(), network.user_visible_message());
        assert_ne!(network.user_visible_message(), ledger.user_visible_message());
    }

    #[test]
    fn signer_device_errors_count_as_network() {
        let err = SubmitError::SigningUnavailable("usb disconnected".into());
        assert_eq!(err.failure_class(), FailureClass::Network);
    }

    #[test]
    fn decode_error_display() {
        let err = DecodeError::InvalidTimestamp("yesterday".into());
        assert_eq!(err.to_string(), "invalid timestamp: yesterday");
        assert_eq!(
            DecodeError::InvalidUtf8("topic").to_string(),
            "invalid utf-8 in topic"
        );
    }
}
