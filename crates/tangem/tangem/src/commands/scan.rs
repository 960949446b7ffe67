use std::collections::HashMap;

use async_trait::async_trait;
use nexum_apdu_core::CardReader;
use tracing::debug;

use super::{DerivedKeys, derive::derive_keys};
use crate::{
    AttestationTask, Card, CardSession, Result,
    session::{CardSessionRunnable, SessionViewState},
};

/// Card snapshot after a scan
#[derive(Debug, Clone)]
pub struct ScanResponse {
    pub card: Card,
    /// Keys derived for the configured paths, by wallet public key
    pub derived_keys: HashMap<Vec<u8>, DerivedKeys>,
}

/// Read the card, attest it and derive the configured wallet keys
#[derive(Debug, Clone, Default)]
pub struct ScanTask {
    attestation: AttestationTask,
}

impl ScanTask {
    pub fn new(attestation: AttestationTask) -> Self {
        Self { attestation }
    }
}

#[async_trait]
impl CardSessionRunnable for ScanTask {
    type Response = ScanResponse;

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        self.attestation.run(session).await?;
        session.set_view_state(SessionViewState::Progress(50));

        let wallets = session.environment().card()?.wallets.clone();
        let mut derived_keys = HashMap::new();
        for wallet in &wallets {
            let paths = session
                .environment()
                .config
                .derivation_paths(wallet.curve)
                .to_vec();
            if paths.is_empty() {
                continue;
            }
            debug!(index = wallet.index, count = paths.len(), "Deriving wallet keys");
            let keys = derive_keys(session, wallet, &paths).await?;
            derived_keys.insert(wallet.public_key.clone(), keys);
        }
        session.set_view_state(SessionViewState::Progress(100));

        Ok(ScanResponse {
            card: session.environment().card()?.clone(),
            derived_keys,
        })
    }
}
