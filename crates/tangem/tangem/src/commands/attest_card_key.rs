use tracing::{debug, warn};

use crate::{
    CardError, Result, SessionEnvironment, TlvTag,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    crypto::verify_signature,
    session::Command,
};

use super::card_tlv_builder;

/// Length of the random challenge sent to the card
pub const CHALLENGE_LENGTH: usize = 16;

/// Proof returned by [`AttestCardKeyCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestCardKeyResponse {
    pub card_id: String,
    pub challenge: [u8; CHALLENGE_LENGTH],
    pub salt: Vec<u8>,
    pub card_signature: Vec<u8>,
}

/// Prove the card holds the private key of its card key
///
/// The card signs `challenge || salt` with the card key. A signature that
/// does not verify against the card public key of the snapshot fails with
/// [`CardError::CardVerificationFailed`].
#[derive(Debug, Clone)]
pub struct AttestCardKeyCommand {
    challenge: [u8; CHALLENGE_LENGTH],
}

impl AttestCardKeyCommand {
    pub fn new() -> Self {
        Self::with_challenge(rand::random())
    }

    pub const fn with_challenge(challenge: [u8; CHALLENGE_LENGTH]) -> Self {
        Self { challenge }
    }
}

impl Default for AttestCardKeyCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for AttestCardKeyCommand {
    type Response = AttestCardKeyResponse;

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let builder = card_tlv_builder(environment)?.append(TlvTag::Challenge, self.challenge);
        Ok(CommandApdu::new(Instruction::VerifyCard, builder.serialize()?))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = response.decoder()?;
        let response = AttestCardKeyResponse {
            card_id: decoder.decode_hex(TlvTag::CardId)?,
            challenge: self.challenge,
            salt: decoder.decode(TlvTag::Salt)?,
            card_signature: decoder.decode(TlvTag::CardSignature)?,
        };

        let message = [self.challenge.as_slice(), &response.salt].concat();
        let card_public_key = &environment.card()?.card_public_key;
        if !verify_signature(card_public_key, &message, &response.card_signature) {
            warn!(card_id = %response.card_id, "Card key signature does not verify");
            return Err(CardError::CardVerificationFailed.into());
        }

        debug!(card_id = %response.card_id, "Card key verified");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{Signature, SigningKey, signature::Signer};
    use rand_v8::thread_rng;

    use super::*;
    use crate::{Error, TlvBuilder, TlvDecoder, types::test_card};

    /// Card response signing `challenge || salt` with `key`
    fn signed_response(key: &SigningKey, challenge: &[u8]) -> Vec<u8> {
        let salt = [0x5A; 16];
        let signature: Signature = key.sign(&[challenge, &salt].concat());
        TlvBuilder::new()
            .append_hex(TlvTag::CardId, "CB79000000018201")
            .unwrap()
            .append(TlvTag::Salt, salt)
            .append(TlvTag::CardSignature, signature.to_bytes().to_vec())
            .serialize()
            .unwrap()
            .to_vec()
    }

    fn env_with_key(key: &SigningKey) -> SessionEnvironment {
        let mut card = test_card();
        card.card_public_key = key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        SessionEnvironment {
            card: Some(card),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_signature() {
        let key = SigningKey::random(&mut thread_rng());
        let mut env = env_with_key(&key);
        let command = AttestCardKeyCommand::with_challenge([7; CHALLENGE_LENGTH]);

        let apdu = command.serialize(&env).unwrap();
        assert_eq!(apdu.instruction, Instruction::VerifyCard);
        let challenge: [u8; CHALLENGE_LENGTH] = TlvDecoder::from_bytes(&apdu.data)
            .unwrap()
            .decode(TlvTag::Challenge)
            .unwrap();
        assert_eq!(challenge, [7; CHALLENGE_LENGTH]);

        let data = signed_response(&key, &challenge);
        let response = command
            .deserialize(&mut env, ResponseApdu::new(data, 0x9000))
            .unwrap();
        assert_eq!(response.salt, [0x5A; 16]);
    }

    #[test]
    fn test_foreign_signature_fails() {
        let key = SigningKey::random(&mut thread_rng());
        let other = SigningKey::random(&mut thread_rng());
        let mut env = env_with_key(&key);
        let command = AttestCardKeyCommand::with_challenge([7; CHALLENGE_LENGTH]);

        let data = signed_response(&other, &[7; CHALLENGE_LENGTH]);
        assert!(matches!(
            command.deserialize(&mut env, ResponseApdu::new(data, 0x9000)),
            Err(Error::Card(CardError::CardVerificationFailed))
        ));
    }

    #[test]
    fn test_random_challenges_differ() {
        assert_ne!(
            AttestCardKeyCommand::new().challenge,
            AttestCardKeyCommand::new().challenge
        );
    }
}
