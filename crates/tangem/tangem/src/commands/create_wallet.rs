use async_trait::async_trait;
use nexum_apdu_core::CardReader;
use tracing::{debug, warn};

use crate::{
    Card, CardError, CardSession, EllipticCurve, Error, FirmwareVersion, Result,
    SessionEnvironment, TlvTag, Wallet, WalletSettings,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    session::{CardSessionRunnable, Command},
};

use super::{ReadWalletsListCommand, index_byte, passcode_tlv_builder};

/// Wallet created by [`CreateWalletCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWalletResponse {
    pub card_id: String,
    pub wallet: Wallet,
}

/// Generate a key pair on the card
///
/// The wallet goes into the lowest free slot unless an index is given.
#[derive(Debug, Clone)]
pub struct CreateWalletCommand {
    curve: EllipticCurve,
    settings: WalletSettings,
    index: Option<u32>,
}

impl CreateWalletCommand {
    pub fn new(curve: EllipticCurve) -> Self {
        Self {
            curve,
            settings: WalletSettings::default(),
            index: None,
        }
    }

    /// Create the wallet as permanent
    pub fn permanent(mut self) -> Self {
        self.settings.is_permanent = true;
        self
    }

    /// Create the wallet in this slot
    pub fn at_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Slot the wallet will be created in
    pub fn wallet_index(&self, card: &Card) -> Result<u32> {
        match self.index {
            Some(index) if index >= card.settings.max_wallets => {
                Err(Error::InvalidData("wallet index out of range"))
            }
            Some(index) if card.wallet(index).is_some() => {
                Err(CardError::InvalidState.into())
            }
            Some(index) => Ok(index),
            None => card
                .next_free_wallet_index()
                .ok_or_else(|| CardError::MaxWalletsCreated.into()),
        }
    }
}

impl Command for CreateWalletCommand {
    type Response = CreateWalletResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if !card.supports(self.curve) {
            return Err(CardError::UnsupportedCurve(self.curve).into());
        }
        self.wallet_index(card).map(|_| ())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let mut builder = passcode_tlv_builder(environment)?
            .append_optional(TlvTag::Cvc, environment.cvc.as_deref());

        if card.firmware_version.is_at_least(&FirmwareVersion::MULTI_WALLET) {
            builder = builder
                .append(TlvTag::WalletIndex, index_byte(self.wallet_index(card)?)?)
                .append(TlvTag::CurveId, self.curve)
                .append(TlvTag::SettingsMask, self.settings.mask());
        }
        Ok(CommandApdu::new(Instruction::CreateWallet, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.decoder()?;
        let wallet = Wallet {
            index: decoder.decode_optional(TlvTag::WalletIndex)?.unwrap_or(0),
            public_key: decoder.decode(TlvTag::WalletPublicKey)?,
            chain_code: decoder.decode_optional(TlvTag::WalletHdChain)?,
            curve: self.curve,
            settings: self.settings,
            total_signed_hashes: Some(0),
        };
        let card_id = decoder.decode_hex(TlvTag::CardId)?;

        debug!(%card_id, index = wallet.index, curve = %wallet.curve, "Wallet created");
        environment.card_mut()?.set_wallet(wallet.clone());
        Ok(CreateWalletResponse { card_id, wallet })
    }
}

/// Create a wallet, recovering from an unacknowledged creation
///
/// A card that created the wallet but lost the tag before answering rejects
/// the retried command with `invalidState`. The task then reads the wallet
/// list and returns the wallet found in the slot it asked for. If that slot is
/// still empty the creation is reported as
/// [`CardError::WalletIndexMismatch`] rather than returning some other wallet.
#[derive(Debug, Clone)]
pub struct CreateWalletTask {
    command: CreateWalletCommand,
}

impl CreateWalletTask {
    pub fn new(curve: EllipticCurve) -> Self {
        Self {
            command: CreateWalletCommand::new(curve),
        }
    }

    pub fn from_command(command: CreateWalletCommand) -> Self {
        Self { command }
    }

    async fn recover<R: CardReader>(
        &self,
        session: &mut CardSession<R>,
        expected: u32,
        known: &[u32],
    ) -> Result<CreateWalletResponse> {
        let list = session.send_command(&ReadWalletsListCommand::new()).await?;

        let created = list
            .wallets
            .iter()
            .find(|w| w.index == expected && w.curve == self.command.curve);
        match created {
            Some(wallet) if !known.contains(&expected) => {
                debug!(index = expected, "Recovered wallet created before the tag was lost");
                Ok(CreateWalletResponse {
                    card_id: list.card_id,
                    wallet: wallet.clone(),
                })
            }
            _ => {
                let actual = list
                    .wallets
                    .iter()
                    .map(|w| w.index)
                    .find(|index| !known.contains(index));
                warn!(expected, ?actual, "Created wallet not found at the expected index");
                Err(CardError::WalletIndexMismatch { expected, actual }.into())
            }
        }
    }
}

#[async_trait]
impl CardSessionRunnable for CreateWalletTask {
    type Response = CreateWalletResponse;

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        let card = session.environment().card()?;
        let expected = self.command.wallet_index(card)?;
        let known: Vec<u32> = card.wallets.iter().map(|w| w.index).collect();

        let command = self.command.clone().at_index(expected);
        match session.send_command(&command).await {
            Err(Error::Card(CardError::InvalidState)) => {
                debug!(index = expected, "Create wallet rejected, checking the wallet list");
                self.recover(session, expected, &known).await
            }
            result => result,
        }
    }
}
