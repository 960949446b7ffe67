use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    AttestationMode, DerivationPath, EllipticCurve, EncryptionMode,
    hdwallet::Bip44,
};

/// Default number of reconnects tolerated per exchange
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Card verification performed by a scan
    pub attestation_mode: AttestationMode,
    /// Encryption requested before the first command
    pub encryption_mode: EncryptionMode,
    /// Paths derived for every wallet of the curve during a scan
    pub default_derivation_paths: HashMap<EllipticCurve, Vec<DerivationPath>>,
    /// Reconnects tolerated per exchange after the tag was lost
    pub reconnect_attempts: u32,
    /// Let the user continue with cards that failed attestation
    pub allow_untrusted_cards: bool,
    /// Prompt for user codes when the card asks for them
    ///
    /// When disabled the code requests surface as errors.
    pub handle_errors: bool,
    /// Never encrypt payloads
    pub legacy_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attestation_mode: AttestationMode::default(),
            encryption_mode: EncryptionMode::default(),
            default_derivation_paths: HashMap::new(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            allow_untrusted_cards: false,
            handle_errors: true,
            legacy_mode: false,
        }
    }
}

impl Config {
    /// Derive the first BIP44 address path for each coin type on secp256k1 wallets
    pub fn with_bip44_coins(mut self, coin_types: &[u32]) -> Self {
        self.default_derivation_paths
            .entry(EllipticCurve::Secp256k1)
            .or_default()
            .extend(coin_types.iter().map(|coin| Bip44::new(*coin).build_path()));
        self
    }

    /// Paths to derive for a wallet on the curve
    pub fn derivation_paths(&self, curve: EllipticCurve) -> &[DerivationPath] {
        self.default_derivation_paths
            .get(&curve)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.reconnect_attempts, 3);
        assert!(config.handle_errors);
        assert!(!config.allow_untrusted_cards);
        assert_eq!(config.attestation_mode, AttestationMode::Normal);
        assert_eq!(config.encryption_mode, EncryptionMode::None);
        assert!(config.derivation_paths(EllipticCurve::Secp256k1).is_empty());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "encryption_mode": "strong",
                "default_derivation_paths": { "secp256k1": ["m/44'/0'/0'/0/0"] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.encryption_mode, EncryptionMode::Strong);
        assert_eq!(config.reconnect_attempts, DEFAULT_RECONNECT_ATTEMPTS);
        assert_eq!(
            config.derivation_paths(EllipticCurve::Secp256k1)[0].to_string(),
            "m/44'/0'/0'/0/0"
        );

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<Config>(&json).unwrap(), config);
    }

    #[test]
    fn test_bip44_coins() {
        let config = Config::default().with_bip44_coins(&[0, 60]);
        let paths: Vec<String> = config
            .derivation_paths(EllipticCurve::Secp256k1)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(paths, ["m/44'/0'/0'/0/0", "m/44'/60'/0'/0/0"]);
    }

    #[test]
    fn test_serialized_fields() {
        let value = serde_json::to_value(Config::default()).unwrap();
        let mut fields: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        fields.sort_unstable();
        assert_eq!(
            fields,
            [
                "allow_untrusted_cards",
                "attestation_mode",
                "default_derivation_paths",
                "encryption_mode",
                "handle_errors",
                "legacy_mode",
                "reconnect_attempts",
            ]
        );
    }
}
