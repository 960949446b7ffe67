use k256::{
    PublicKey, SecretKey,
    ecdh::SharedSecret,
    ecdsa::{Signature, VerifyingKey, signature::Verifier},
};

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF)
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, byte| {
        (0..8).fold(crc ^ (u16::from(*byte) << 8), |crc, _| {
            if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            }
        })
    })
}

pub(crate) fn generate_ecdh_shared_secret(private: &SecretKey, public: &PublicKey) -> SharedSecret {
    k256::elliptic_curve::ecdh::diffie_hellman(private.to_nonzero_scalar(), public.as_affine())
}

/// Verify a secp256k1 ECDSA signature over SHA-256 of `message`
///
/// `signature` is the 64 byte `r || s` form returned by the card.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{SigningKey, signature::Signer};
    use rand_v8::thread_rng;

    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_ecdh() {
        let host = SecretKey::random(&mut thread_rng());
        let card = SecretKey::random(&mut thread_rng());

        let a = generate_ecdh_shared_secret(&host, &card.public_key());
        let b = generate_ecdh_shared_secret(&card, &host.public_key());
        assert_eq!(a.raw_secret_bytes(), b.raw_secret_bytes());
    }

    #[test]
    fn test_verify_signature() {
        let key = SigningKey::random(&mut thread_rng());
        let public_key = key.verifying_key().to_encoded_point(false);
        let signature: Signature = key.sign(b"challenge");

        assert!(verify_signature(
            public_key.as_bytes(),
            b"challenge",
            &signature.to_bytes()
        ));
        assert!(!verify_signature(
            public_key.as_bytes(),
            b"challenger",
            &signature.to_bytes()
        ));
        assert!(!verify_signature(&[0x04; 3], b"challenge", &signature.to_bytes()));
        assert!(!verify_signature(public_key.as_bytes(), b"challenge", &[0; 10]));
    }
}
