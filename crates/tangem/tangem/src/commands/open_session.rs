use k256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand_v8::thread_rng;
use tracing::trace;

use crate::{
    ProtocolError, Result, SessionEnvironment, TlvBuilder, TlvTag,
    apdu::{CommandApdu, Instruction, ResponseApdu},
    crypto::generate_ecdh_shared_secret,
    secure_channel::{EncryptionMode, SessionKey},
    session::{Command, PreflightReadMode},
};

/// Negotiate a session key with the card
///
/// The host sends an ephemeral secp256k1 public key, the card answers with
/// its own and both sides hash the ECDH shared secret into the key.
pub struct OpenSessionCommand {
    secret: SecretKey,
}

impl OpenSessionCommand {
    pub fn new() -> Self {
        Self {
            secret: SecretKey::random(&mut thread_rng()),
        }
    }

    /// Uncompressed SEC1 encoding of the host ephemeral key
    pub fn host_public_key(&self) -> Vec<u8> {
        self.secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }
}

impl Default for OpenSessionCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OpenSessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSessionCommand").finish_non_exhaustive()
    }
}

impl Command for OpenSessionCommand {
    type Response = SessionKey;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn serialize(&self, _environment: &SessionEnvironment) -> Result<CommandApdu> {
        let data = TlvBuilder::new()
            .append(TlvTag::SessionKeyA, self.host_public_key())
            .serialize()?;
        Ok(CommandApdu {
            p1: EncryptionMode::Strong.p1(),
            ..CommandApdu::new(Instruction::OpenSession, data)
        })
    }

    fn deserialize(
        &self,
        _environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let card_key: Vec<u8> = response.decoder()?.decode(TlvTag::SessionKeyB)?;
        trace!(card_key = %hex::encode(&card_key), "Card session key");

        let card_key = PublicKey::from_sec1_bytes(&card_key)
            .map_err(|_| ProtocolError::ConversionFailed(TlvTag::SessionKeyB))?;
        let shared = generate_ecdh_shared_secret(&self.secret, &card_key);
        Ok(SessionKey::from_shared_secret(shared.raw_secret_bytes()))
    }
}
