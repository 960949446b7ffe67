use crate::{
    EllipticCurve, ExtendedPublicKey, ProtocolError, TlvDecoder, TlvTag,
    hdwallet::{CHAIN_CODE_LENGTH, COMPRESSED_KEY_LENGTH},
};

/// Lifecycle of a wallet slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Empty,
    Loaded,
    Purged,
}

impl WalletStatus {
    /// Decode the status byte reported by the card
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Empty),
            2 => Some(Self::Loaded),
            3 => Some(Self::Purged),
            _ => None,
        }
    }
}

/// Wallet settings bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletSettings {
    /// The wallet cannot be purged
    pub is_permanent: bool,
}

impl WalletSettings {
    const PERMANENT: u32 = 0x0004;

    /// Decode from the settings mask
    pub const fn from_mask(mask: u32) -> Self {
        Self {
            is_permanent: mask & Self::PERMANENT != 0,
        }
    }

    /// Encode to the settings mask
    pub const fn mask(&self) -> u32 {
        if self.is_permanent { Self::PERMANENT } else { 0 }
    }
}

/// A key pair created on the card
///
/// Wallets are snapshots: a changed wallet on the card arrives as a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    /// Slot index on the card
    pub index: u32,
    /// Public key of the wallet
    pub public_key: Vec<u8>,
    /// BIP32 chain code for HD wallets
    pub chain_code: Option<Vec<u8>>,
    /// Curve of the key pair
    pub curve: EllipticCurve,
    /// Wallet settings
    pub settings: WalletSettings,
    /// Number of hashes signed so far
    pub total_signed_hashes: Option<u32>,
}

impl Wallet {
    /// Decode a wallet from card records
    ///
    /// `curve` is used when the card omits the curve id (single curve cards).
    pub fn from_decoder(
        decoder: &TlvDecoder,
        curve: Option<EllipticCurve>,
    ) -> Result<Self, ProtocolError> {
        let curve = match decoder.decode_optional(TlvTag::CurveId)? {
            Some(curve) => curve,
            None => curve.ok_or(ProtocolError::MissingTag(TlvTag::CurveId))?,
        };

        Ok(Self {
            index: decoder.decode(TlvTag::WalletIndex)?,
            public_key: decoder.decode(TlvTag::WalletPublicKey)?,
            chain_code: decoder.decode_optional(TlvTag::WalletHdChain)?,
            curve,
            settings: decoder
                .decode_optional(TlvTag::WalletSettings)?
                .map(WalletSettings::from_mask)
                .unwrap_or_default(),
            total_signed_hashes: decoder.decode_optional(TlvTag::WalletSignedHashes)?,
        })
    }

    /// Extended public key for local derivation, if the wallet supports it
    pub fn extended_public_key(&self) -> Option<ExtendedPublicKey> {
        if self.curve != EllipticCurve::Secp256k1 {
            return None;
        }
        let chain_code = self.chain_code.as_deref()?;
        if self.public_key.len() != COMPRESSED_KEY_LENGTH || chain_code.len() != CHAIN_CODE_LENGTH
        {
            return None;
        }
        ExtendedPublicKey::from_slices(&self.public_key, chain_code).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TlvBuilder;

    const KEY: &str = "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2";
    const CHAIN: &str = "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508";

    fn wallet_tlv(curve: Option<EllipticCurve>) -> TlvDecoder {
        let bytes = TlvBuilder::new()
            .append(TlvTag::WalletIndex, 1u8)
            .append(TlvTag::WalletPublicKey, hex::decode(KEY).unwrap())
            .append(TlvTag::WalletHdChain, hex::decode(CHAIN).unwrap())
            .append_optional(TlvTag::CurveId, curve)
            .append(TlvTag::WalletSettings, 0x0004u32)
            .serialize()
            .unwrap();
        TlvDecoder::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_wallet_from_decoder() {
        let wallet = Wallet::from_decoder(&wallet_tlv(Some(EllipticCurve::Secp256k1)), None).unwrap();
        assert_eq!(wallet.index, 1);
        assert!(wallet.settings.is_permanent);
        assert_eq!(wallet.total_signed_hashes, None);

        let xpub = wallet.extended_public_key().unwrap();
        assert_eq!(hex::encode(xpub.compressed_public_key()), KEY);
    }

    #[test]
    fn test_wallet_curve_fallback() {
        assert_eq!(
            Wallet::from_decoder(&wallet_tlv(None), None),
            Err(ProtocolError::MissingTag(TlvTag::CurveId))
        );
        let wallet = Wallet::from_decoder(&wallet_tlv(None), Some(EllipticCurve::Ed25519)).unwrap();
        assert_eq!(wallet.curve, EllipticCurve::Ed25519);
        assert!(wallet.extended_public_key().is_none());
    }
}
