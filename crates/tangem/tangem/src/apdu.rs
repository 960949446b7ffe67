//! Command and response envelopes of the Tangem card protocol.

use bytes::Bytes;
use nexum_apdu_core::{Command, Response, StatusWord};
use tracing::trace;

use crate::{
    ProtocolError, TlvDecoder, TlvTag,
    secure_channel::{EncryptionMode, SessionKey},
};

const CLA: u8 = 0x00;
/// The card reports the security delay in 10 ms ticks
const PAUSE_TICK_MS: u32 = 10;

/// Instruction codes understood by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Read,
    Personalize,
    WriteIssuerData,
    VerifyCard,
    VerifyCode,
    ReadIssuerData,
    CreateWallet,
    SetPin,
    Sign,
    PurgeWallet,
    Activate,
    OpenSession,
    WriteUserData,
    ReadUserData,
    Depersonalize,
    WriteFileData,
    ReadFileData,
}

impl Instruction {
    pub const fn code(self) -> u8 {
        match self {
            Self::Read => 0xF2,
            Self::Personalize => 0xF1,
            Self::WriteIssuerData => 0xF0,
            Self::VerifyCard => 0xF3,
            Self::VerifyCode => 0xF4,
            Self::ReadIssuerData => 0xF6,
            Self::CreateWallet => 0xF8,
            Self::SetPin => 0xFA,
            Self::Sign => 0xFB,
            Self::PurgeWallet => 0xFC,
            Self::Activate => 0xFE,
            Self::OpenSession => 0xFF,
            Self::WriteUserData => 0xE0,
            Self::ReadUserData => 0xE1,
            Self::Depersonalize => 0xE3,
            Self::WriteFileData => 0xD0,
            Self::ReadFileData => 0xD1,
        }
    }
}

/// A command ready to be sent to the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    pub instruction: Instruction,
    pub p1: u8,
    pub p2: u8,
    pub data: Bytes,
}

impl CommandApdu {
    /// Create a plaintext command carrying a serialized TLV payload
    pub fn new(instruction: Instruction, data: impl Into<Bytes>) -> Self {
        Self {
            instruction,
            p1: EncryptionMode::None.p1(),
            p2: 0x00,
            data: data.into(),
        }
    }

    /// Encrypt the payload with the session key, if any
    pub fn encrypt(self, key: Option<&SessionKey>) -> Result<Self, ProtocolError> {
        let Some(key) = key else {
            return Ok(self);
        };
        Ok(Self {
            p1: EncryptionMode::Strong.p1(),
            data: key.encrypt(&self.data)?,
            ..self
        })
    }

    /// ISO 7816 envelope, always in the extended length form
    pub fn to_command(&self) -> Command {
        Command::new_with_data(
            CLA,
            self.instruction.code(),
            self.p1,
            self.p2,
            self.data.clone(),
        )
        .with_le(0)
        .with_extended_length()
    }

    /// Wire bytes, failing if the payload overflows the extended Lc field
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        self.to_command()
            .to_bytes()
            .map_err(|_| ProtocolError::ValueTooLong(self.data.len()))
    }
}

/// Card status taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    /// Card is counting down before it executes the command
    SecurityDelay { remaining_ms: u32 },
    Pin1Required,
    Pin2Required,
    InvalidState,
    NeedsEncryption,
    ErrorProcessingCommand,
    InvalidParams,
    InsNotSupported,
    FileNotFound,
    WalletNotFound,
    Unknown(u16),
}

impl ResponseStatus {
    const SECURITY_DELAY: u16 = 0x9789;

    /// Classify a status word
    ///
    /// The delay countdown is not part of the status word; it is filled in by
    /// [`ResponseApdu::status`].
    pub const fn from_status_word(sw: u16) -> Self {
        match sw {
            0x9000..=0x9003 => Self::Success,
            Self::SECURITY_DELAY => Self::SecurityDelay { remaining_ms: 0 },
            0x6AF1 => Self::Pin1Required,
            0x6AF2 => Self::Pin2Required,
            0x6985 => Self::InvalidState,
            0x6982 => Self::NeedsEncryption,
            0x6286 => Self::ErrorProcessingCommand,
            0x6A86 => Self::InvalidParams,
            0x6D00 => Self::InsNotSupported,
            0x6A82 => Self::FileNotFound,
            0x6A88 => Self::WalletNotFound,
            other => Self::Unknown(other),
        }
    }
}

/// A raw response from the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    data: Bytes,
    sw: StatusWord,
}

impl ResponseApdu {
    pub fn new(data: impl Into<Bytes>, sw: u16) -> Self {
        Self {
            data: data.into(),
            sw: StatusWord::from_u16(sw),
        }
    }

    /// Parse `data || sw1 sw2`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (data, sw) = Response::from_bytes(bytes)
            .map_err(|_| ProtocolError::DeserializeApduFailed)?
            .into_parts();
        Ok(Self { data, sw })
    }

    pub const fn sw(&self) -> u16 {
        self.sw.to_u16()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub const fn is_success(&self) -> bool {
        matches!(
            ResponseStatus::from_status_word(self.sw()),
            ResponseStatus::Success
        )
    }

    /// Status, with the remaining delay decoded from the payload
    pub fn status(&self) -> ResponseStatus {
        match ResponseStatus::from_status_word(self.sw()) {
            ResponseStatus::SecurityDelay { .. } => {
                let ticks = TlvDecoder::from_bytes(&self.data)
                    .and_then(|d| d.decode_optional::<u32>(TlvTag::Pause))
                    .ok()
                    .flatten()
                    .unwrap_or(0);
                ResponseStatus::SecurityDelay {
                    remaining_ms: ticks.saturating_mul(PAUSE_TICK_MS),
                }
            }
            status => status,
        }
    }

    /// Decrypt the payload with the session key, if any
    ///
    /// Only successful responses carry encrypted payloads.
    pub fn decrypt(self, key: Option<&SessionKey>) -> Result<Self, ProtocolError> {
        match key {
            Some(key) if self.is_success() && !self.data.is_empty() => Ok(Self {
                data: key.decrypt(&self.data)?,
                sw: self.sw,
            }),
            _ => Ok(self),
        }
    }

    /// Decode the payload records
    pub fn decoder(&self) -> Result<TlvDecoder, ProtocolError> {
        TlvDecoder::from_bytes(&self.data).map_err(|error| {
            trace!(%error, data = %hex::encode(&self.data), "Response is not valid TLV");
            ProtocolError::DeserializeApduFailed
        })
    }
}
