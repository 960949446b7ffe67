use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    BackupStatus, Card, CardError, CardSettings, DerivationPath, EllipticCurve, FirmwareVersion,
    Issuer, Result, SessionEnvironment, TlvBuilder, TlvDecoder, TlvTag, Wallet, WalletSettings,
    WalletStatus,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    session::{Command, PreflightReadMode},
};

use super::card_tlv_builder;

/// What a read request returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InteractionMode {
    ReadCard,
    ReadWallet,
    ReadWalletList,
}

impl InteractionMode {
    const fn code(self) -> u8 {
        match self {
            Self::ReadCard => 0x01,
            Self::ReadWallet => 0x02,
            Self::ReadWalletList => 0x03,
        }
    }
}

/// Card status byte of a card that left the factory without a personality
const STATUS_NOT_PERSONALIZED: u8 = 0;
/// The card reports delays in 10 ms ticks
const PAUSE_TICK_MS: u32 = 10;

/// Read the card and store the snapshot in the session environment
///
/// This is the preflight read every session performs. Wallets of multi
/// wallet cards are read separately by [`ReadWalletsListCommand`].
#[derive(Debug, Clone, Default)]
pub struct ReadCommand;

impl ReadCommand {
    pub const fn new() -> Self {
        Self
    }
}

impl Command for ReadCommand {
    type Response = Card;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let mut builder = TlvBuilder::new()
            .append(TlvTag::Pin, environment.access_code.value_or_default())
            .append(TlvTag::InteractionMode, InteractionMode::ReadCard.code());
        if let Some(card) = &environment.card {
            builder = builder.append_hex(TlvTag::CardId, &card.card_id)?;
        }
        Ok(CommandApdu::new(Instruction::Read, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let mut card = decode_card(&response.decoder()?)?;

        if let Some(previous) = &environment.card {
            if previous.card_id == card.card_id {
                card.attestation = previous.attestation;
                if card.wallets.is_empty() {
                    card.wallets = previous.wallets.clone();
                }
            }
        }

        debug!(card_id = %card.card_id, firmware = %card.firmware_version, "Card read");
        environment.card = Some(card.clone());
        Ok(card)
    }
}

fn decode_card(decoder: &TlvDecoder) -> Result<Card> {
    let card_id = decoder.decode_hex(TlvTag::CardId)?;
    let status: u8 = decoder.decode(TlvTag::Status)?;
    if status == STATUS_NOT_PERSONALIZED {
        return Err(CardError::NotPersonalized.into());
    }

    let firmware_version: FirmwareVersion = decoder.decode(TlvTag::FirmwareVersion)?;
    let multi_wallet = firmware_version.is_at_least(&FirmwareVersion::MULTI_WALLET);
    let legacy_curve: Option<EllipticCurve> = decoder.decode_optional(TlvTag::CurveId)?;

    let supported_curves = if multi_wallet {
        EllipticCurve::ALL.to_vec()
    } else {
        legacy_curve.into_iter().collect()
    };

    let backup_status = match decoder.decode_optional::<u8>(TlvTag::BackupStatus)? {
        Some(status) => {
            let count = decoder.decode_optional(TlvTag::BackupCount)?.unwrap_or(0);
            BackupStatus::from_raw(status, count)
        }
        None => None,
    };

    let access_code_is_default = decoder
        .decode_optional::<bool>(TlvTag::PinIsDefault)?
        .unwrap_or(false);
    let passcode_is_default = decoder.decode_optional::<bool>(TlvTag::Pin2IsDefault)?;

    let settings = CardSettings {
        security_delay_ms: decoder
            .decode_optional::<u32>(TlvTag::PauseBeforePin2)?
            .unwrap_or(0)
            .saturating_mul(PAUSE_TICK_MS),
        max_wallets: decoder.decode_optional(TlvTag::WalletsCount)?.unwrap_or(1),
        mask: decoder.decode_optional(TlvTag::SettingsMask)?.unwrap_or(0),
    };

    let wallets = match (multi_wallet, legacy_curve) {
        (false, Some(curve)) => decode_legacy_wallet(decoder, curve, &settings)?
            .into_iter()
            .collect(),
        _ => Vec::new(),
    };

    Ok(Card {
        card_id,
        batch_id: decoder.decode_hex_optional(TlvTag::BatchId)?,
        manufacturer_name: decoder.decode(TlvTag::ManufacturerName)?,
        issuer: Issuer {
            name: decoder
                .decode_optional(TlvTag::IssuerName)?
                .unwrap_or_default(),
            public_key: decoder.decode_optional(TlvTag::IssuerDataPublicKey)?,
        },
        firmware_version,
        card_public_key: decoder.decode(TlvTag::CardPublicKey)?,
        settings,
        supported_curves,
        wallets,
        backup_status,
        is_access_code_set: !access_code_is_default,
        is_passcode_set: if multi_wallet {
            Some(!passcode_is_default.unwrap_or(false))
        } else {
            passcode_is_default.map(|is_default| !is_default)
        },
        attestation: Default::default(),
    })
}

/// Single wallet embedded in the read response of pre-4.0 firmware
fn decode_legacy_wallet(
    decoder: &TlvDecoder,
    curve: EllipticCurve,
    settings: &CardSettings,
) -> Result<Option<Wallet>> {
    let Some(public_key) = decoder.decode_optional::<Vec<u8>>(TlvTag::WalletPublicKey)? else {
        return Ok(None);
    };
    Ok(Some(Wallet {
        index: 0,
        public_key,
        chain_code: None,
        curve,
        settings: WalletSettings::from_mask(settings.mask),
        total_signed_hashes: decoder.decode_optional(TlvTag::WalletSignedHashes)?,
    }))
}

/// Wallets returned by [`ReadWalletsListCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletsListResponse {
    pub card_id: String,
    pub wallets: Vec<Wallet>,
}

/// Read every loaded wallet of a multi wallet card
#[derive(Debug, Clone, Default)]
pub struct ReadWalletsListCommand;

impl ReadWalletsListCommand {
    pub const fn new() -> Self {
        Self
    }
}

impl Command for ReadWalletsListCommand {
    type Response = WalletsListResponse;

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = card_tlv_builder(environment)?
            .append(TlvTag::InteractionMode, InteractionMode::ReadWalletList.code());
        Ok(CommandApdu::new(Instruction::Read, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.decoder()?;
        let card_id = decoder.decode_hex(TlvTag::CardId)?;

        let mut wallets = Vec::new();
        for info in decoder.decode_all::<Bytes>(TlvTag::WalletInfo)? {
            let info = TlvDecoder::from_bytes(&info)?;
            let status = info
                .decode_optional::<u8>(TlvTag::WalletStatus)?
                .and_then(WalletStatus::from_byte);
            if status != Some(WalletStatus::Loaded) {
                trace!(?status, "Skipping wallet slot");
                continue;
            }
            wallets.push(Wallet::from_decoder(&info, None)?);
        }
        wallets.sort_by_key(|w| w.index);

        debug!(%card_id, count = wallets.len(), "Wallets read");
        if let Some(card) = environment.card.as_mut().filter(|c| c.card_id == card_id) {
            card.set_wallets(wallets.clone());
        }
        Ok(WalletsListResponse { card_id, wallets })
    }
}

/// Wallet returned by [`ReadWalletCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWalletResponse {
    pub card_id: String,
    /// The wallet, or the derived child key when a path was requested
    pub wallet: Wallet,
}

/// Read one wallet, optionally deriving a child key on the card
#[derive(Debug, Clone)]
pub struct ReadWalletCommand {
    public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
}

impl ReadWalletCommand {
    pub fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key: public_key.into(),
            derivation_path: None,
        }
    }

    /// Ask the card to derive the key at `path`, hardened nodes included
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }
}

impl Command for ReadWalletCommand {
    type Response = ReadWalletResponse;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        let wallet = card
            .wallet_by_public_key(&self.public_key)
            .ok_or(CardError::WalletNotFound)?;
        if self.derivation_path.is_some() && wallet.chain_code.is_none() {
            return Err(CardError::InvalidParams.into());
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = card_tlv_builder(environment)?
            .append(TlvTag::InteractionMode, InteractionMode::ReadWallet.code())
            .append(TlvTag::WalletPublicKey, self.public_key.as_slice())
            .append_optional(TlvTag::WalletHdPath, self.derivation_path.as_ref());
        Ok(CommandApdu::new(Instruction::Read, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.decoder()?;
        let card_id = decoder.decode_hex(TlvTag::CardId)?;
        let curve = environment
            .card
            .as_ref()
            .and_then(|card| card.wallet_by_public_key(&self.public_key))
            .map(|wallet| wallet.curve);
        let wallet = Wallet::from_decoder(&decoder, curve)?;

        if self.derivation_path.is_none() {
            if let Some(card) = environment.card.as_mut() {
                card.set_wallet(wallet.clone());
            }
        }
        Ok(ReadWalletResponse { card_id, wallet })
    }
}
