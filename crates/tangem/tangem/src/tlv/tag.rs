//! Tag enumeration understood by the card firmware.

macro_rules! tlv_tags {
    ($( $(#[$meta:meta])* $name:ident = $value:literal ),* $(,)?) => {
        /// TLV tags used in card payloads
        ///
        /// Tags outside the known set decode to [`TlvTag::Unknown`] and keep their
        /// raw value, so unknown payloads survive a decode/encode cycle.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum TlvTag {
            $( $(#[$meta])* $name, )*
            /// A tag this version of the engine does not know about
            Unknown(u8),
        }

        impl From<u8> for TlvTag {
            fn from(value: u8) -> Self {
                match value {
                    $( $value => Self::$name, )*
                    other => Self::Unknown(other),
                }
            }
        }

        impl From<TlvTag> for u8 {
            fn from(tag: TlvTag) -> Self {
                match tag {
                    $( TlvTag::$name => $value, )*
                    TlvTag::Unknown(value) => value,
                }
            }
        }
    };
}

tlv_tags! {
    /// Card identifier, 8 bytes rendered as hex
    CardId = 0x01,
    /// Card lifecycle status
    Status = 0x02,
    /// Card public key
    CardPublicKey = 0x03,
    /// Signature produced with the card key
    CardSignature = 0x04,
    /// Elliptic curve name
    CurveId = 0x05,
    /// Maximum number of signatures per wallet
    MaxSignatures = 0x08,
    /// Security delay before passcode protected operations, in 10 ms ticks
    PauseBeforePin2 = 0x09,
    /// Card settings bit mask
    SettingsMask = 0x0A,
    /// NFC tag UID
    Uid = 0x0B,

    /// Access code hash
    Pin = 0x10,
    /// Passcode hash
    Pin2 = 0x11,
    /// New access code hash
    NewPin = 0x12,
    /// New passcode hash
    NewPin2 = 0x13,
    /// Random challenge for attestation
    Challenge = 0x16,
    /// Card generated salt for attestation
    Salt = 0x17,
    /// Card verification code printed on the card
    Cvc = 0x19,
    /// Host public key for session negotiation
    SessionKeyA = 0x1A,
    /// Card public key for session negotiation
    SessionKeyB = 0x1B,
    /// Remaining security delay, in 10 ms ticks
    Pause = 0x1C,

    /// Manufacturer name
    ManufacturerName = 0x20,
    /// Sub-mode of a multi purpose instruction
    InteractionMode = 0x23,
    /// Index of a file on the card
    FileIndex = 0x26,
    /// File settings bit mask
    FileSettings = 0x27,
    /// Raw file data
    FileData = 0x28,

    /// Issuer public key for issuer data
    IssuerDataPublicKey = 0x30,

    /// Concatenated hashes to sign
    TransactionOutHash = 0x50,
    /// Size of a single hash in `TransactionOutHash`
    TransactionOutHashSize = 0x51,
    /// Whether the passcode is still the factory default
    Pin2IsDefault = 0x59,
    /// Whether the access code is still the factory default
    PinIsDefault = 0x5A,

    /// Wallet public key
    WalletPublicKey = 0x60,
    /// Concatenated signatures
    WalletSignature = 0x61,
    /// Remaining signatures of the wallet
    WalletRemainingSignatures = 0x62,
    /// Number of hashes signed by the wallet
    WalletSignedHashes = 0x63,
    /// Nested TLV describing one wallet
    WalletInfo = 0x64,
    /// Wallet index
    WalletIndex = 0x65,
    /// Number of wallet slots on the card
    WalletsCount = 0x66,
    /// Wallet status
    WalletStatus = 0x67,
    /// Wallet settings bit mask
    WalletSettings = 0x68,
    /// HD derivation path
    WalletHdPath = 0x6A,
    /// HD chain code
    WalletHdChain = 0x6B,

    /// Name of a named file
    FileTypeName = 0x70,
    /// Counter of a named file
    FileCounter = 0x72,
    /// Signature of a named file
    FileSignature = 0x73,

    /// Firmware version string
    FirmwareVersion = 0x80,
    /// Batch identifier
    BatchId = 0x81,
    /// Issuer name
    IssuerName = 0x83,

    /// Backup status
    BackupStatus = 0xD0,
    /// Number of linked backup cards
    BackupCount = 0xD1,
}
