use std::collections::HashMap;

use async_trait::async_trait;
use nexum_apdu_core::CardReader;
use tracing::trace;

use crate::{
    CardError, CardSession, DerivationPath, ExtendedPublicKey, ProtocolError, Result, TlvTag,
    Wallet, session::CardSessionRunnable,
};

use super::ReadWalletCommand;

/// Extended public keys of one wallet, by path
pub type DerivedKeys = HashMap<DerivationPath, ExtendedPublicKey>;

/// Derive the extended public key of a wallet at a path
///
/// Paths without hardened nodes are derived on the host from the wallet key.
/// Hardened paths are sent to the card.
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeyTask {
    wallet_public_key: Vec<u8>,
    path: DerivationPath,
}

impl DeriveWalletPublicKeyTask {
    pub fn new(wallet_public_key: impl Into<Vec<u8>>, path: DerivationPath) -> Self {
        Self {
            wallet_public_key: wallet_public_key.into(),
            path,
        }
    }
}

#[async_trait]
impl CardSessionRunnable for DeriveWalletPublicKeyTask {
    type Response = ExtendedPublicKey;

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        let wallet = session
            .environment()
            .card()?
            .wallet_by_public_key(&self.wallet_public_key)
            .cloned()
            .ok_or(CardError::WalletNotFound)?;
        derive_key(session, &wallet, &self.path).await
    }
}

/// Derive one key for `wallet`, locally when the path allows it
pub(crate) async fn derive_key<R: CardReader>(
    session: &mut CardSession<R>,
    wallet: &Wallet,
    path: &DerivationPath,
) -> Result<ExtendedPublicKey> {
    if !path.has_hardened() {
        if let Some(root) = wallet.extended_public_key() {
            trace!(%path, "Deriving locally");
            return Ok(root.derive_path(path)?);
        }
    }

    trace!(%path, "Deriving on the card");
    let command =
        ReadWalletCommand::new(wallet.public_key.clone()).with_derivation_path(path.clone());
    let derived = session.send_command(&command).await?.wallet;
    let chain_code = derived
        .chain_code
        .ok_or(ProtocolError::MissingTag(TlvTag::WalletHdChain))?;
    Ok(ExtendedPublicKey::from_slices(&derived.public_key, &chain_code)?)
}

/// Derive every path for `wallet`
pub(crate) async fn derive_keys<R: CardReader>(
    session: &mut CardSession<R>,
    wallet: &Wallet,
    paths: &[DerivationPath],
) -> Result<DerivedKeys> {
    let mut keys = DerivedKeys::with_capacity(paths.len());
    for path in paths {
        let key = derive_key(session, wallet, path).await?;
        keys.insert(path.clone(), key);
    }
    Ok(keys)
}
