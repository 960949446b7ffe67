use tracing::debug;

use crate::{
    Card, CardError, Result, SessionEnvironment, TlvTag,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    session::Command,
};

use super::{SuccessResponse, index_byte, passcode_tlv_builder};

/// Delete a wallet and its private key from the card
#[derive(Debug, Clone)]
pub struct PurgeWalletCommand {
    public_key: Vec<u8>,
}

impl PurgeWalletCommand {
    pub fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }
}

impl Command for PurgeWalletCommand {
    type Response = SuccessResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        let wallet = card
            .wallet_by_public_key(&self.public_key)
            .ok_or(CardError::WalletNotFound)?;
        if wallet.settings.is_permanent {
            return Err(CardError::PurgeWalletProhibited.into());
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let wallet = environment
            .card()?
            .wallet_by_public_key(&self.public_key)
            .ok_or(CardError::WalletNotFound)?;
        let builder = passcode_tlv_builder(environment)?
            .append(TlvTag::WalletIndex, index_byte(wallet.index)?);
        Ok(CommandApdu::new(Instruction::PurgeWallet, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let response = SuccessResponse::from_decoder(&response.decoder()?)?;
        let card = environment.card_mut()?;
        if let Some(index) = card.wallet_by_public_key(&self.public_key).map(|w| w.index) {
            card.remove_wallet(index);
            debug!(index, "Wallet purged");
        }
        Ok(response)
    }
}
