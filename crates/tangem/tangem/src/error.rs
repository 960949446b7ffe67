use nexum_apdu_core::TransportError;

use crate::{EllipticCurve, ResponseStatus, TlvTag};

/// Result type for Tangem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Tangem operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed bytes on the wire
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Errors reported by the card through its status word
    #[error(transparent)]
    Card(#[from] CardError),

    /// Errors caused by the person holding the card
    #[error(transparent)]
    User(#[from] UserError),

    /// Key derivation errors
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// Attestation trust errors
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Secure storage errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Caller supplied arguments the card would reject
    #[error("Invalid data: {0}")]
    InvalidData(&'static str),
}

impl Error {
    /// Whether this error is a user cancellation
    pub const fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::User(UserError::Cancelled))
    }
}

impl From<nexum_apdu_core::Error> for Error {
    fn from(error: nexum_apdu_core::Error) -> Self {
        match error {
            nexum_apdu_core::Error::Transport(e) => Self::Transport(e),
            nexum_apdu_core::Error::PayloadTooLong(len) => {
                Self::Protocol(ProtocolError::ValueTooLong(len))
            }
            nexum_apdu_core::Error::IncompleteResponse(_)
            | nexum_apdu_core::Error::InvalidCommandLength(_) => {
                Self::Protocol(ProtocolError::DeserializeApduFailed)
            }
        }
    }
}

/// Errors while encoding or decoding the card protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed TLV data")]
    MalformedTlv,

    #[error("Missing TLV tag {0:?}")]
    MissingTag(TlvTag),

    #[error("Failed to convert TLV value for tag {0:?}")]
    ConversionFailed(TlvTag),

    #[error("TLV value too long: {0} bytes")]
    ValueTooLong(usize),

    #[error("Failed to deserialize APDU")]
    DeserializeApduFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Failed to establish encryption with the card")]
    SessionNegotiationFailed,
}

/// Errors reported by the card
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardError {
    #[error("Card is in an invalid state for this command")]
    InvalidState,

    #[error("Card requires an encrypted channel")]
    NeedsEncryption,

    #[error("Card failed to process the command")]
    ErrorProcessingCommand,

    #[error("Card rejected the command parameters")]
    InvalidParams,

    #[error("Instruction not supported by the card")]
    InsNotSupported,

    #[error("File not found")]
    FileNotFound,

    #[error("Wallet not found")]
    WalletNotFound,

    #[error("Access code required")]
    AccessCodeRequired,

    #[error("Passcode required")]
    PasscodeRequired,

    #[error("Unknown status word {0:#06X}")]
    Unknown(u16),

    #[error("Wallet expected at index {expected} but card reports {actual:?}")]
    WalletIndexMismatch { expected: u32, actual: Option<u32> },

    #[error("Maximum number of wallets created")]
    MaxWalletsCreated,

    #[error("Curve {0} is not supported by the card")]
    UnsupportedCurve(EllipticCurve),

    #[error("Card must be read before running this command")]
    MissingPreflightRead,

    #[error("Card is not personalized")]
    NotPersonalized,

    #[error("Wallet is permanent and cannot be purged")]
    PurgeWalletProhibited,

    #[error("Card signature verification failed")]
    CardVerificationFailed,
}

impl CardError {
    /// Map a non-success status to a card error
    ///
    /// Returns `None` for statuses the session handles itself (success and
    /// security delay).
    pub const fn from_status(status: ResponseStatus) -> Option<Self> {
        Some(match status {
            ResponseStatus::Success | ResponseStatus::SecurityDelay { .. } => return None,
            ResponseStatus::Pin1Required => Self::AccessCodeRequired,
            ResponseStatus::Pin2Required => Self::PasscodeRequired,
            ResponseStatus::InvalidState => Self::InvalidState,
            ResponseStatus::NeedsEncryption => Self::NeedsEncryption,
            ResponseStatus::ErrorProcessingCommand => Self::ErrorProcessingCommand,
            ResponseStatus::InvalidParams => Self::InvalidParams,
            ResponseStatus::InsNotSupported => Self::InsNotSupported,
            ResponseStatus::FileNotFound => Self::FileNotFound,
            ResponseStatus::WalletNotFound => Self::WalletNotFound,
            ResponseStatus::Unknown(code) => Self::Unknown(code),
        })
    }
}

/// Errors caused by the user or the UI
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("User cancelled the operation")]
    Cancelled,

    #[error("Wrong card presented: expected {expected}, got {actual}")]
    WrongCard { expected: String, actual: String },

    #[error("Entered codes do not match")]
    CodeMismatch,
}

/// Errors during extended public key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    #[error("Hardened derivation is not supported for public keys")]
    HardenedNotSupported,

    #[error("Key derivation failed")]
    DerivationFailed,

    #[error("Wrong derivation path")]
    WrongPath,
}

/// Errors while loading or verifying cached attestations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error("Signature of the attestation cache is invalid")]
    SignatureVerificationFailed,

    #[error("Attestation cache is corrupted: {0}")]
    Corrupted(String),
}

/// Errors raised by the secure storage and enclave capabilities
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Secure storage failure: {0}")]
    Backend(String),

    #[error("Secure enclave failure: {0}")]
    Enclave(String),
}
