//! Host side engine for Tangem contactless cards.
//!
//! The crate speaks the card's TLV over APDU protocol through any
//! [`CardReader`](nexum_apdu_core::CardReader). A [`CardSession`] sequences
//! commands against one card tap, [`TangemSdk`] wraps the common operations
//! and [`TrustedCardsRepo`] caches attestation results between sessions.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod apdu;
mod attestation;
mod commands;
mod config;
mod crypto;
mod error;
mod hdwallet;
mod sdk;
mod secure_channel;
mod session;
mod storage;
mod tlv;
mod types;

pub use apdu::{CommandApdu, Instruction, ResponseApdu, ResponseStatus};
pub use attestation::{
    Attestation, AttestationMode, AttestationStatus, AttestationTask, MAX_TRUSTED_CARDS,
    OnlineCardVerifier, SCHEMA_VERSION, SharedTrustedCards, TrustedCardsRepo,
};
pub use commands::*;
pub use config::{Config, DEFAULT_RECONNECT_ATTEMPTS};
pub use crypto::{crc16, verify_signature};
pub use error::{
    CardError, DerivationError, Error, ProtocolError, Result, StorageError, TrustError, UserError,
};
pub use hdwallet::{
    Bip44, CHAIN_CODE_LENGTH, COMPRESSED_KEY_LENGTH, Chain, DerivationNode, DerivationPath,
    ExtendedPublicKey, HARDENED_OFFSET,
};
pub use sdk::{ReaderFactory, TangemSdk};
pub use secure_channel::{EncryptionMode, SESSION_KEY_LENGTH, SessionKey};
pub use session::{
    AttestationDecision, CardSession, CardSessionRunnable, Command, PreflightReadMode,
    SessionCanceller, SessionEnvironment, SessionEvent, SessionState, SessionViewState,
};
pub use storage::{MemoryEnclave, MemoryStorage, SecureEnclave, SecureStorage};
pub use tlv::{Tlv, TlvBuilder, TlvDecode, TlvDecoder, TlvEncode, TlvTag};
pub use types::{
    BackupStatus, Card, CardSettings, EllipticCurve, File, FileSettings, FileVisibility,
    FirmwareType, FirmwareVersion, Issuer, NamedFile, UserCode, UserCodeType, Wallet,
    WalletSettings, WalletStatus,
};
