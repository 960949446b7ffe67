use async_trait::async_trait;
use nexum_apdu_core::CardReader;
use tracing::debug;

use crate::{
    Card, CardError, CardSession, DerivationPath, Error, FirmwareVersion, ProtocolError, Result,
    SessionEnvironment, TlvTag,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    session::{CardSessionRunnable, Command},
};

use super::passcode_tlv_builder;

/// Length of an `r || s` signature returned by the card
const SIGNATURE_LENGTH: usize = 64;

/// Signatures returned by [`SignHashesCommand`], in the order of the hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignHashesResponse {
    pub card_id: String,
    pub signatures: Vec<Vec<u8>>,
    pub total_signed_hashes: Option<u32>,
}

/// Sign several hashes of equal length with one wallet
#[derive(Debug, Clone)]
pub struct SignHashesCommand {
    hashes: Vec<Vec<u8>>,
    wallet_public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
}

impl SignHashesCommand {
    pub fn new(hashes: Vec<Vec<u8>>, wallet_public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            hashes,
            wallet_public_key: wallet_public_key.into(),
            derivation_path: None,
        }
    }

    /// Sign with the child key at `path` instead of the wallet key
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }

    fn hash_size(&self) -> Result<u8> {
        let size = self
            .hashes
            .first()
            .map(Vec::len)
            .ok_or(Error::InvalidData("no hashes to sign"))?;
        if size == 0 || self.hashes.iter().any(|h| h.len() != size) {
            return Err(Error::InvalidData("hashes must be non-empty and of equal length"));
        }
        u8::try_from(size).map_err(|_| Error::InvalidData("hash too long"))
    }
}

impl Command for SignHashesCommand {
    type Response = SignHashesResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        self.hash_size()?;
        let wallet = card
            .wallet_by_public_key(&self.wallet_public_key)
            .ok_or(CardError::WalletNotFound)?;
        if self.derivation_path.is_some()
            && (wallet.chain_code.is_none()
                || !card.firmware_version.is_at_least(&FirmwareVersion::MULTI_WALLET))
        {
            return Err(CardError::InvalidParams.into());
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = passcode_tlv_builder(environment)?
            .append(TlvTag::TransactionOutHashSize, self.hash_size()?)
            .append(TlvTag::TransactionOutHash, self.hashes.concat())
            .append(TlvTag::WalletPublicKey, self.wallet_public_key.as_slice())
            .append_optional(TlvTag::WalletHdPath, self.derivation_path.as_ref())
            .append_optional(TlvTag::Cvc, environment.cvc.as_deref());
        Ok(CommandApdu::new(Instruction::Sign, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.decoder()?;
        let card_id = decoder.decode_hex(TlvTag::CardId)?;
        let signature: Vec<u8> = decoder.decode(TlvTag::WalletSignature)?;
        let total_signed_hashes = decoder.decode_optional(TlvTag::WalletSignedHashes)?;

        let (chunks, rest) = signature.as_chunks::<SIGNATURE_LENGTH>();
        if !rest.is_empty() || chunks.len() != self.hashes.len() {
            return Err(ProtocolError::ConversionFailed(TlvTag::WalletSignature).into());
        }
        let signatures = chunks.iter().map(|chunk| chunk.to_vec()).collect();

        if let Some(total) = total_signed_hashes {
            let card = environment.card_mut()?;
            if let Some(mut wallet) = card.wallet_by_public_key(&self.wallet_public_key).cloned() {
                wallet.total_signed_hashes = Some(total);
                card.set_wallet(wallet);
            }
        }

        debug!(%card_id, count = self.hashes.len(), "Hashes signed");
        Ok(SignHashesResponse {
            card_id,
            signatures,
            total_signed_hashes,
        })
    }
}

/// Signature returned by [`SignHashCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignHashResponse {
    pub card_id: String,
    pub signature: Vec<u8>,
    pub total_signed_hashes: Option<u32>,
}

/// Sign a single hash
#[derive(Debug, Clone)]
pub struct SignHashCommand {
    inner: SignHashesCommand,
}

impl SignHashCommand {
    pub fn new(hash: impl Into<Vec<u8>>, wallet_public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: SignHashesCommand::new(vec![hash.into()], wallet_public_key),
        }
    }

    pub fn with_derivation_path(self, path: DerivationPath) -> Self {
        Self {
            inner: self.inner.with_derivation_path(path),
        }
    }
}

#[async_trait]
impl CardSessionRunnable for SignHashCommand {
    type Response = SignHashResponse;

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        let response = session.send_command(&self.inner).await?;
        let signature = response
            .signatures
            .into_iter()
            .next()
            .ok_or(ProtocolError::MissingTag(TlvTag::WalletSignature))?;
        Ok(SignHashResponse {
            card_id: response.card_id,
            signature,
            total_signed_hashes: response.total_signed_hashes,
        })
    }
}
