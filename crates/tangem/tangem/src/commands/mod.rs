//! Commands and tasks runnable in a [`CardSession`](crate::CardSession).
//!
//! A command is one request/response exchange. A task composes several
//! commands and drives the session itself.

mod attest_card_key;
mod create_wallet;
mod derive;
mod files;
mod open_session;
mod purge_wallet;
mod read;
mod scan;
mod sign;
mod user_codes;

pub use attest_card_key::{AttestCardKeyCommand, AttestCardKeyResponse};
pub use create_wallet::{CreateWalletCommand, CreateWalletResponse, CreateWalletTask};
pub use derive::{DeriveWalletPublicKeyTask, DerivedKeys};
pub use files::{
    DeleteFileCommand, ReadFileCommand, ReadFilesTask, WriteFileCommand, WriteFileResponse,
};
pub use open_session::OpenSessionCommand;
pub use purge_wallet::PurgeWalletCommand;
pub use read::{
    ReadCommand, ReadWalletCommand, ReadWalletResponse, ReadWalletsListCommand,
    WalletsListResponse,
};
pub use scan::{ScanResponse, ScanTask};
pub use sign::{SignHashCommand, SignHashResponse, SignHashesCommand, SignHashesResponse};
pub use user_codes::{ChangeUserCodeTask, ResetPinCommand, SetUserCodeCommand};

use crate::{Error, Result, SessionEnvironment, TlvBuilder, TlvDecoder, TlvTag};

/// Response of commands that only echo the card id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessResponse {
    pub card_id: String,
}

impl SuccessResponse {
    pub(crate) fn from_decoder(decoder: &TlvDecoder) -> Result<Self> {
        Ok(Self {
            card_id: decoder.decode_hex(TlvTag::CardId)?,
        })
    }
}

/// Records sent with every card-bound command: access code and card id
pub(crate) fn card_tlv_builder(environment: &SessionEnvironment) -> Result<TlvBuilder> {
    Ok(TlvBuilder::new()
        .append(TlvTag::Pin, environment.access_code.value_or_default())
        .append_hex(TlvTag::CardId, environment.card_id()?)?)
}

/// Same as [`card_tlv_builder`] with the passcode appended
pub(crate) fn passcode_tlv_builder(environment: &SessionEnvironment) -> Result<TlvBuilder> {
    Ok(card_tlv_builder(environment)?
        .append(TlvTag::Pin2, environment.passcode.value_or_default()))
}

/// Wallet and file indices travel as a single byte
pub(crate) fn index_byte(index: u32) -> Result<u8> {
    u8::try_from(index).map_err(|_| Error::InvalidData("index does not fit in one byte"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{UserCode, UserCodeType, types::test_card};

    #[test]
    fn test_card_tlv_builder() {
        let mut env = SessionEnvironment::default();
        assert!(card_tlv_builder(&env).is_err());

        env.card = Some(test_card());
        env.passcode = UserCode::new(UserCodeType::Passcode, "1234");
        let builder = passcode_tlv_builder(&env).unwrap();
        let tags: Vec<_> = builder.tlvs().iter().map(|tlv| tlv.tag).collect();
        assert_eq!(tags, [TlvTag::Pin, TlvTag::CardId, TlvTag::Pin2]);

        assert_eq!(
            builder.tlvs()[0].value.as_ref(),
            UserCode::default_for(UserCodeType::AccessCode).value().unwrap()
        );
        assert_eq!(hex::encode_upper(&builder.tlvs()[1].value), "CB79000000018201");
    }

    #[test]
    fn test_index_byte() {
        assert_eq!(index_byte(3).unwrap(), 3);
        assert!(matches!(index_byte(256), Err(Error::InvalidData(_))));
    }
}
