//! Symmetric encryption of APDU payloads.
//!
//! Once a session key is negotiated every command payload is framed as
//! `len (u16 BE) || crc16 (u16 BE) || payload` and encrypted with AES-256-CBC
//! (zero IV, PKCS7 padding). Decryption checks padding, length and CRC and
//! fails with [`ProtocolError::DecryptionFailed`] instead of returning
//! garbage.

use bytes::{BufMut, Bytes, BytesMut};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{ProtocolError, crypto::crc16};

type Encryptor = cbc::Encryptor<aes::Aes256>;
type Decryptor = cbc::Decryptor<aes::Aes256>;

/// Length of the negotiated key
pub const SESSION_KEY_LENGTH: usize = 32;

const BLOCK_SIZE: usize = 16;
const HEADER_LENGTH: usize = 4;
const IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Encryption requested from the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Plaintext unless the card insists
    #[default]
    None,
    /// Negotiate a session key before the first command
    Strong,
}

impl EncryptionMode {
    /// Value carried in P1 of every command
    pub const fn p1(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Strong => 0x02,
        }
    }
}

/// Symmetric key of an encrypted session
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LENGTH]);

impl SessionKey {
    pub const fn new(key: [u8; SESSION_KEY_LENGTH]) -> Self {
        Self(key)
    }

    /// Derive the key from the ECDH shared secret
    pub fn from_shared_secret(secret: &[u8]) -> Self {
        Self(Sha256::digest(secret).into())
    }

    pub const fn as_bytes(&self) -> &[u8; SESSION_KEY_LENGTH] {
        &self.0
    }

    /// Encrypt a command payload
    pub fn encrypt(&self, payload: &[u8]) -> Result<Bytes, ProtocolError> {
        let len = u16::try_from(payload.len())
            .map_err(|_| ProtocolError::ValueTooLong(payload.len()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + payload.len() + BLOCK_SIZE);
        buf.put_u16(len);
        buf.put_u16(crc16(payload));
        buf.put_slice(payload);

        let msg_len = prepare_padding(&mut buf);
        let encrypted = Encryptor::new_from_slices(&self.0, &IV)
            .map_err(|_| ProtocolError::EncryptionFailed)?
            .encrypt_padded_mut::<Pkcs7>(&mut buf, msg_len)
            .map_err(|_| ProtocolError::EncryptionFailed)?;

        trace!(plain = payload.len(), encrypted = encrypted.len(), "Encrypted payload");
        Ok(Bytes::copy_from_slice(encrypted))
    }

    /// Decrypt a response payload
    pub fn decrypt(&self, data: &[u8]) -> Result<Bytes, ProtocolError> {
        let mut buf = data.to_vec();
        let decrypted = Decryptor::new_from_slices(&self.0, &IV)
            .map_err(|_| ProtocolError::DecryptionFailed)?
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| ProtocolError::DecryptionFailed)?;

        let [l1, l2, c1, c2, payload @ ..] = decrypted else {
            return Err(ProtocolError::DecryptionFailed);
        };
        if usize::from(u16::from_be_bytes([*l1, *l2])) != payload.len()
            || u16::from_be_bytes([*c1, *c2]) != crc16(payload)
        {
            trace!(len = payload.len(), "Decrypted frame failed integrity check");
            return Err(ProtocolError::DecryptionFailed);
        }

        Ok(Bytes::copy_from_slice(payload))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Grow the buffer to the next block boundary and return the message length
fn prepare_padding(data: &mut BytesMut) -> usize {
    let len = data.len();
    data.resize(len + BLOCK_SIZE - len % BLOCK_SIZE, 0);

    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new([0x42; SESSION_KEY_LENGTH])
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = key();
        for len in [0, 1, 11, 12, 13, 300] {
            let payload = vec![0xA5; len];
            let encrypted = key.encrypt(&payload).unwrap();
            assert_eq!(encrypted.len() % BLOCK_SIZE, 0);
            assert_ne!(&encrypted[..], &payload[..]);
            assert_eq!(key.decrypt(&encrypted).unwrap().as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn test_deterministic() {
        let key = key();
        assert_eq!(key.encrypt(b"abc").unwrap(), key.encrypt(b"abc").unwrap());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = key();
        let mut encrypted = key.encrypt(&[0x11; 40]).unwrap().to_vec();
        encrypted[5] ^= 0x80;
        assert_eq!(key.decrypt(&encrypted), Err(ProtocolError::DecryptionFailed));
    }

    #[test]
    fn test_wrong_key_or_length_fails() {
        let encrypted = key().encrypt(b"payload").unwrap();
        let other = SessionKey::new([0x43; SESSION_KEY_LENGTH]);
        assert_eq!(other.decrypt(&encrypted), Err(ProtocolError::DecryptionFailed));
        assert_eq!(
            key().decrypt(&encrypted[..15]),
            Err(ProtocolError::DecryptionFailed)
        );
        assert_eq!(key().decrypt(&[]), Err(ProtocolError::DecryptionFailed));
    }

    #[test]
    fn test_session_key_from_secret() {
        let key = SessionKey::from_shared_secret(b"");
        assert_eq!(
            hex::encode(key.as_bytes()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }
}
