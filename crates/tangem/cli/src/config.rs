use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use nexum_tangem::Config;
use tracing::debug;

/// Prefix of the environment variables overriding config fields
const ENV_PREFIX: &str = "TANGEM_";

/// Defaults, then the optional file, then `TANGEM_*` variables
fn figment(file: Option<&Path>) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    }
    figment.merge(Env::prefixed(ENV_PREFIX))
}

pub fn load_config(file: Option<&Path>) -> Result<Config, figment::Error> {
    if let Some(file) = file {
        debug!(?file, "Loading config");
    }
    figment(file).extract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexum_tangem::{AttestationMode, DerivationPath, EllipticCurve};

    #[test]
    fn test_defaults() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .extract()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            attestation_mode = "offline"
            reconnect_attempts = 5

            [default_derivation_paths]
            secp256k1 = ["m/44'/0'/0'/0/0"]
        "#;
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert_eq!(config.attestation_mode, AttestationMode::Offline);
        assert_eq!(config.reconnect_attempts, 5);
        assert!(config.handle_errors);
        let path: DerivationPath = "m/44'/0'/0'/0/0".parse().unwrap();
        assert_eq!(config.derivation_paths(EllipticCurve::Secp256k1), &[path]);
    }

    #[test]
    fn test_printed_config_loads_back() {
        let config = Config::default().with_bip44_coins(&[0, 60]);
        let printed = toml::to_string_pretty(&config).unwrap();

        let loaded: Config = Figment::new().merge(Toml::string(&printed)).extract().unwrap();
        assert_eq!(loaded, config);
    }
}
