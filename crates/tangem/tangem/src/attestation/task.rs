use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use nexum_apdu_core::CardReader;
use tracing::{debug, warn};

use super::{Attestation, AttestationMode, AttestationStatus, SharedTrustedCards};
use crate::{
    CardError, CardSession, Error, Result, UserError,
    commands::AttestCardKeyCommand,
    session::{AttestationDecision, CardSessionRunnable, SessionEvent},
};

/// Online check of a card key against the manufacturer records
#[async_trait]
pub trait OnlineCardVerifier: Send + Sync + Debug {
    /// Whether the card key belongs to a genuine card
    async fn verify(&self, card_id: &str, card_public_key: &[u8]) -> Result<bool>;
}

/// Verify the card and record the outcome in the card snapshot
///
/// The card key is always challenged. In normal mode the key is then looked
/// up in the trust cache and, failing that, checked by the online verifier.
/// Outcomes short of full verification are confirmed with the user.
#[derive(Debug, Clone, Default)]
pub struct AttestationTask {
    mode: AttestationMode,
    trusted_cards: Option<SharedTrustedCards>,
    verifier: Option<Arc<dyn OnlineCardVerifier>>,
}

enum Outcome {
    Accepted,
    Retry,
}

impl AttestationTask {
    pub fn new(mode: AttestationMode) -> Self {
        Self {
            mode,
            trusted_cards: None,
            verifier: None,
        }
    }

    pub fn with_trusted_cards(mut self, trusted_cards: SharedTrustedCards) -> Self {
        self.trusted_cards = Some(trusted_cards);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn OnlineCardVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    fn cached(&self, card_public_key: &[u8]) -> Option<Attestation> {
        self.trusted_cards
            .as_ref()
            .and_then(|cards| cards.lock().attestation(card_public_key))
    }

    fn remember(&self, card_public_key: &[u8], attestation: Attestation) {
        let Some(cards) = &self.trusted_cards else {
            return;
        };
        if let Err(error) = cards.lock().append(card_public_key, attestation) {
            warn!(%error, "Failed to store attestation");
        }
    }

    async fn attest<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Attestation> {
        let card = session.environment().card()?;
        let card_id = card.card_id.clone();
        let card_public_key = card.card_public_key.clone();
        let is_development = card.firmware_version.is_development();

        let mut attestation = Attestation::SKIPPED;
        if is_development {
            attestation.firmware = AttestationStatus::Warning;
        }

        attestation.card_key = match session.send_command(&AttestCardKeyCommand::new()).await {
            Ok(_) => AttestationStatus::VerifiedOffline,
            Err(Error::Card(CardError::CardVerificationFailed)) => AttestationStatus::Failed,
            Err(error) => return Err(error),
        };
        if attestation.card_key == AttestationStatus::Failed
            || self.mode == AttestationMode::Offline
        {
            return Ok(attestation);
        }

        if let Some(cached) = self.cached(&card_public_key) {
            if cached.card_key == AttestationStatus::Verified {
                debug!(%card_id, "Card found in the trust cache");
                attestation.card_key = AttestationStatus::Verified;
                return Ok(attestation);
            }
        }

        let Some(verifier) = &self.verifier else {
            return Ok(attestation);
        };
        match verifier.verify(&card_id, &card_public_key).await {
            Ok(true) => {
                attestation.card_key = AttestationStatus::Verified;
                self.remember(&card_public_key, attestation);
            }
            Ok(false) => attestation.card_key = AttestationStatus::Failed,
            Err(error) => warn!(%error, "Online verification unavailable"),
        }
        Ok(attestation)
    }

    async fn confirm<R: CardReader>(
        &self,
        session: &mut CardSession<R>,
        attestation: &Attestation,
    ) -> Result<Outcome> {
        let is_dev_card = session.environment().card()?.firmware_version.is_development();
        let allow_untrusted = session.environment().config.allow_untrusted_cards;

        let decision = if attestation.card_key == AttestationStatus::Failed {
            if !allow_untrusted && !is_dev_card {
                return Err(CardError::CardVerificationFailed.into());
            }
            session
                .request_attestation_decision(|reply| SessionEvent::AttestationDidFail {
                    is_dev_card,
                    reply,
                })
                .await?
        } else if attestation.card_key == AttestationStatus::VerifiedOffline
            && self.mode == AttestationMode::Normal
        {
            session
                .request_attestation_decision(|reply| {
                    SessionEvent::AttestationCompletedOffline { reply }
                })
                .await?
        } else if attestation.status() == AttestationStatus::Warning {
            session
                .request_attestation_decision(|reply| {
                    SessionEvent::AttestationCompletedWithWarnings { reply }
                })
                .await?
        } else {
            AttestationDecision::Continue
        };

        match decision {
            AttestationDecision::Continue => Ok(Outcome::Accepted),
            AttestationDecision::Retry => Ok(Outcome::Retry),
            AttestationDecision::Cancel => Err(UserError::Cancelled.into()),
        }
    }
}

#[async_trait]
impl CardSessionRunnable for AttestationTask {
    type Response = Attestation;

    async fn run<R: CardReader>(&self, session: &mut CardSession<R>) -> Result<Self::Response> {
        loop {
            let attestation = self.attest(session).await?;
            debug!(status = ?attestation.status(), "Card attested");

            match self.confirm(session, &attestation).await {
                Ok(Outcome::Accepted) => {
                    session.environment_mut().card_mut()?.attestation = attestation;
                    return Ok(attestation);
                }
                Ok(Outcome::Retry) => debug!("Retrying attestation"),
                Err(error) => {
                    if let Ok(card) = session.environment_mut().card_mut() {
                        card.attestation = attestation;
                    }
                    return Err(error);
                }
            }
        }
    }
}
