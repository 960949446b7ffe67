use std::{fmt, str::FromStr};

use crate::{Attestation, EllipticCurve, TlvDecode, Wallet};

/// Build flavour of the card firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareType {
    Release,
    Sdk,
    Special,
}

/// Firmware version, e.g. `4.52r`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub kind: FirmwareType,
}

impl FirmwareVersion {
    /// First firmware with multiple wallets and HD keys
    pub const MULTI_WALLET: Self = Self::new(4, 0);

    /// Create a release version
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: 0,
            kind: FirmwareType::Release,
        }
    }

    /// Whether this is a development (SDK) card
    pub fn is_development(&self) -> bool {
        self.kind == FirmwareType::Sdk
    }

    /// Compare version numbers, ignoring the build flavour
    pub fn is_at_least(&self, other: &Self) -> bool {
        (self.major, self.minor, self.patch) >= (other.major, other.minor, other.patch)
    }
}

impl FromStr for FirmwareVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (numbers, suffix) = s.split_at(split);

        let mut parts = numbers.split('.').map(|p| p.parse::<u32>().map_err(|_| ()));
        let major = parts.next().ok_or(())??;
        let minor = parts.next().transpose()?.unwrap_or(0);
        let patch = parts.next().transpose()?.unwrap_or(0);
        if parts.next().is_some() {
            return Err(());
        }

        let suffix = suffix.trim();
        let kind = if suffix.is_empty() || suffix.eq_ignore_ascii_case("r") {
            FirmwareType::Release
        } else if suffix.to_ascii_lowercase().contains("sdk") {
            FirmwareType::Sdk
        } else {
            FirmwareType::Special
        };

        Ok(Self {
            major,
            minor,
            patch,
            kind,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.patch != 0 {
            write!(f, ".{}", self.patch)?;
        }
        match self.kind {
            FirmwareType::Release => write!(f, "r"),
            FirmwareType::Sdk => write!(f, " SDK"),
            FirmwareType::Special => Ok(()),
        }
    }
}

impl TlvDecode for FirmwareVersion {
    fn decode_value(value: &[u8]) -> Option<Self> {
        String::decode_value(value)?.parse().ok()
    }
}

/// Backup state of the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    NoBackup,
    CardLinked { cards_count: u8 },
    Active { cards_count: u8 },
}

impl BackupStatus {
    /// Decode the status byte and the linked cards count
    pub const fn from_raw(status: u8, cards_count: u8) -> Option<Self> {
        match status {
            0 => Some(Self::NoBackup),
            1 => Some(Self::CardLinked { cards_count }),
            2 => Some(Self::Active { cards_count }),
            _ => None,
        }
    }

    /// Whether the backup is complete
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Card wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardSettings {
    /// Security delay in milliseconds
    pub security_delay_ms: u32,
    /// Number of wallet slots
    pub max_wallets: u32,
    /// Raw settings mask
    pub mask: u32,
}

/// Issuer of the card
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Issuer {
    pub name: String,
    pub public_key: Option<Vec<u8>>,
}

/// Snapshot of a card, built from read responses
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub card_id: String,
    pub batch_id: Option<String>,
    pub manufacturer_name: String,
    pub issuer: Issuer,
    pub firmware_version: FirmwareVersion,
    pub card_public_key: Vec<u8>,
    pub settings: CardSettings,
    pub supported_curves: Vec<EllipticCurve>,
    /// Wallets ordered by index, indices are unique
    pub wallets: Vec<Wallet>,
    pub backup_status: Option<BackupStatus>,
    pub is_access_code_set: bool,
    /// `None` on firmware that does not report it
    pub is_passcode_set: Option<bool>,
    pub attestation: Attestation,
}

impl Card {
    /// Wallet at the index
    pub fn wallet(&self, index: u32) -> Option<&Wallet> {
        self.wallets.iter().find(|w| w.index == index)
    }

    /// Wallet with the public key
    pub fn wallet_by_public_key(&self, public_key: &[u8]) -> Option<&Wallet> {
        self.wallets.iter().find(|w| w.public_key == public_key)
    }

    /// Lowest index without a wallet
    pub fn next_free_wallet_index(&self) -> Option<u32> {
        (0..self.settings.max_wallets).find(|index| self.wallet(*index).is_none())
    }

    /// Whether the card can create keys on the curve
    pub fn supports(&self, curve: EllipticCurve) -> bool {
        self.supported_curves.contains(&curve)
    }

    /// Insert or replace a wallet, keeping the list ordered by index
    pub fn set_wallet(&mut self, wallet: Wallet) {
        match self.wallets.binary_search_by_key(&wallet.index, |w| w.index) {
            Ok(pos) => self.wallets[pos] = wallet,
            Err(pos) => self.wallets.insert(pos, wallet),
        }
    }

    /// Replace the wallet list
    pub fn set_wallets(&mut self, mut wallets: Vec<Wallet>) {
        wallets.sort_by_key(|w| w.index);
        wallets.dedup_by_key(|w| w.index);
        self.wallets = wallets;
    }

    /// Remove the wallet at the index
    pub fn remove_wallet(&mut self, index: u32) -> Option<Wallet> {
        let pos = self.wallets.iter().position(|w| w.index == index)?;
        Some(self.wallets.remove(pos))
    }
}
