//! Card attestation results and the signed cache of trusted cards.

mod repo;
mod task;

use std::{fmt, str::FromStr};

pub use repo::{MAX_TRUSTED_CARDS, SCHEMA_VERSION, SharedTrustedCards, TrustedCardsRepo};
pub use task::{AttestationTask, OnlineCardVerifier};

/// Outcome of a single attestation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttestationStatus {
    Failed,
    Warning,
    #[default]
    Skipped,
    VerifiedOffline,
    Verified,
}

impl AttestationStatus {
    const fn code(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Warning => 1,
            Self::Skipped => 2,
            Self::VerifiedOffline => 3,
            Self::Verified => 4,
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Failed),
            1 => Some(Self::Warning),
            2 => Some(Self::Skipped),
            3 => Some(Self::VerifiedOffline),
            4 => Some(Self::Verified),
            _ => None,
        }
    }

    /// Whether the check passed, online or offline
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified | Self::VerifiedOffline)
    }
}

/// How much verification a scan performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationMode {
    /// Only the card key signature is checked
    Offline,
    /// Card key signature plus online verification when available
    #[default]
    Normal,
}

/// Attestation of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attestation {
    pub card_key: AttestationStatus,
    pub wallet_keys: AttestationStatus,
    pub firmware: AttestationStatus,
    pub card_uniqueness: AttestationStatus,
    /// Insertion rank inside the trust cache
    pub index: u32,
}

impl Attestation {
    /// Nothing was checked
    pub const SKIPPED: Self = Self {
        card_key: AttestationStatus::Skipped,
        wallet_keys: AttestationStatus::Skipped,
        firmware: AttestationStatus::Skipped,
        card_uniqueness: AttestationStatus::Skipped,
        index: 0,
    };

    fn statuses(&self) -> [AttestationStatus; 4] {
        [
            self.card_key,
            self.wallet_keys,
            self.firmware,
            self.card_uniqueness,
        ]
    }

    /// Aggregated status, worst result first
    pub fn status(&self) -> AttestationStatus {
        let statuses = self.statuses();
        if statuses.contains(&AttestationStatus::Failed) {
            AttestationStatus::Failed
        } else if statuses.contains(&AttestationStatus::Warning) {
            AttestationStatus::Warning
        } else {
            self.card_key
        }
    }

    /// Compact persisted form: four status codes and the index, comma separated
    pub fn raw_representation(&self) -> String {
        self.to_string()
    }

    /// Parse the persisted form
    pub fn from_raw_representation(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for status in self.statuses() {
            write!(f, "{},", status.code())?;
        }
        write!(f, "{}", self.index)
    }
}

impl FromStr for Attestation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [card_key, wallet_keys, firmware, uniqueness, index] = parts.as_slice() else {
            return Err(());
        };
        let status = |raw: &str| {
            raw.parse::<u8>()
                .ok()
                .and_then(AttestationStatus::from_code)
                .ok_or(())
        };

        Ok(Self {
            card_key: status(card_key)?,
            wallet_keys: status(wallet_keys)?,
            firmware: status(firmware)?,
            card_uniqueness: status(uniqueness)?,
            index: index.parse().map_err(|_| ())?,
        })
    }
}
