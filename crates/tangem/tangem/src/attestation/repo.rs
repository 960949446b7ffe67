use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::Attestation;
use crate::{
    Error, Result, TrustError,
    storage::{SecureEnclave, SecureStorage},
};

/// Maximum number of cached attestations
pub const MAX_TRUSTED_CARDS: usize = 1000;

/// Version of the persisted layout
///
/// A cache written under another version is discarded on
/// [`TrustedCardsRepo::initialize`].
pub const SCHEMA_VERSION: u32 = 1;

/// Trust cache shared between sessions
pub type SharedTrustedCards = Arc<Mutex<TrustedCardsRepo>>;

mod keys {
    pub(super) const ATTESTED_CARDS: &str = "attestedCards";
    pub(super) const SIGNATURE: &str = "signatureOfAttestedCards";
    pub(super) const SCHEMA_VERSION: &str = "attestedCardsSchemaVersion";
}

/// Signed cache of cards that passed attestation
///
/// Entries are keyed by the SHA-256 of the card public key. The persisted map
/// is signed by the [`SecureEnclave`] on every save and only trusted on load
/// if the signature verifies; otherwise the cache starts empty.
#[derive(Debug)]
pub struct TrustedCardsRepo {
    storage: Arc<dyn SecureStorage>,
    enclave: Arc<dyn SecureEnclave>,
    data: BTreeMap<String, Attestation>,
}

impl TrustedCardsRepo {
    /// Create an empty repo; call [`initialize`](Self::initialize) to load it
    pub fn new(storage: Arc<dyn SecureStorage>, enclave: Arc<dyn SecureEnclave>) -> Self {
        Self {
            storage,
            enclave,
            data: BTreeMap::new(),
        }
    }

    /// Create, initialize and wrap for sharing
    pub fn shared(
        storage: Arc<dyn SecureStorage>,
        enclave: Arc<dyn SecureEnclave>,
    ) -> Result<SharedTrustedCards> {
        let mut repo = Self::new(storage, enclave);
        repo.initialize()?;
        Ok(Arc::new(Mutex::new(repo)))
    }

    /// Load the persisted cache, discarding it if the schema version differs
    pub fn initialize(&mut self) -> Result<()> {
        let stored = self
            .storage
            .get(keys::SCHEMA_VERSION)?
            .and_then(|raw| String::from_utf8(raw).ok())
            .and_then(|raw| raw.parse::<u32>().ok());

        if stored == Some(SCHEMA_VERSION) {
            self.fetch()
        } else {
            debug!(?stored, current = SCHEMA_VERSION, "Discarding trust cache");
            self.wipe()?;
            self.storage
                .store(keys::SCHEMA_VERSION, SCHEMA_VERSION.to_string().as_bytes())?;
            Ok(())
        }
    }

    /// Drop every cached attestation
    pub fn reset(&mut self) -> Result<()> {
        self.wipe()
    }

    /// Cached attestation for a card
    pub fn attestation(&self, card_public_key: &[u8]) -> Option<Attestation> {
        self.data.get(&cache_key(card_public_key)).copied()
    }

    /// Cache an attestation and persist the cache
    ///
    /// The entry gets the next index. Entries with the lowest index are
    /// evicted so the cache stays below [`MAX_TRUSTED_CARDS`]. Nothing changes
    /// in memory if persisting fails.
    pub fn append(&mut self, card_public_key: &[u8], attestation: Attestation) -> Result<()> {
        let key = cache_key(card_public_key);
        let index = self.data.values().map(|a| a.index).max().unwrap_or(0) + 1;

        let mut data = self.data.clone();
        if !data.contains_key(&key) {
            while data.len() + 1 >= MAX_TRUSTED_CARDS {
                let Some(oldest) = data
                    .iter()
                    .min_by_key(|(_, a)| a.index)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                debug!(%oldest, "Evicting oldest attestation");
                data.remove(&oldest);
            }
        }
        data.insert(key, Attestation { index, ..attestation });

        self.save(&data)?;
        self.data = data;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn wipe(&mut self) -> Result<()> {
        self.data.clear();
        self.storage.delete(keys::ATTESTED_CARDS)?;
        self.storage.delete(keys::SIGNATURE)?;
        Ok(())
    }

    fn save(&self, data: &BTreeMap<String, Attestation>) -> Result<()> {
        let raw: BTreeMap<&str, String> = data
            .iter()
            .map(|(k, a)| (k.as_str(), a.raw_representation()))
            .collect();
        let encoded =
            serde_json::to_vec(&raw).map_err(|e| TrustError::Corrupted(e.to_string()))?;
        let signature = self.enclave.sign(&encoded)?;

        self.storage.store(keys::ATTESTED_CARDS, &encoded)?;
        self.storage.store(keys::SIGNATURE, &signature)?;
        Ok(())
    }

    fn fetch(&mut self) -> Result<()> {
        match self.load() {
            Ok(data) => {
                debug!(entries = data.len(), "Loaded trust cache");
                self.data = data;
                Ok(())
            }
            Err(Error::Trust(error)) => {
                warn!(%error, "Ignoring persisted trust cache");
                self.data.clear();
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, Attestation>> {
        let Some(encoded) = self.storage.get(keys::ATTESTED_CARDS)? else {
            return Ok(BTreeMap::new());
        };
        let signature = self
            .storage
            .get(keys::SIGNATURE)?
            .ok_or(TrustError::SignatureVerificationFailed)?;
        if !self.enclave.verify(&signature, &encoded)? {
            return Err(TrustError::SignatureVerificationFailed.into());
        }

        let raw: BTreeMap<String, String> =
            serde_json::from_slice(&encoded).map_err(|e| TrustError::Corrupted(e.to_string()))?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| Some((k, Attestation::from_raw_representation(&v)?)))
            .collect())
    }
}

fn cache_key(card_public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(card_public_key))
}
