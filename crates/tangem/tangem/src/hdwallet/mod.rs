//! Public-only BIP32 key derivation.
//!
//! Only non-hardened children can be derived from a public key: hardened
//! nodes need the parent private key and are refused with
//! [`DerivationError::HardenedNotSupported`].

mod bip44;
mod path;

use hmac::{Hmac, Mac};
use k256::{
    AffinePoint, FieldBytes, ProjectivePoint, PublicKey, Scalar,
    elliptic_curve::{PrimeField, sec1::ToEncodedPoint},
};
use sha2::Sha512;
use tracing::trace;

pub use bip44::{Bip44, Chain};
pub use path::{DerivationNode, DerivationPath, HARDENED_OFFSET};

use crate::DerivationError;

/// Length of a BIP32 chain code
pub const CHAIN_CODE_LENGTH: usize = 32;
/// Length of a SEC1 compressed secp256k1 point
pub const COMPRESSED_KEY_LENGTH: usize = 33;

type HmacSha512 = Hmac<Sha512>;

/// secp256k1 public key with its chain code
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExtendedPublicKey {
    public_key: [u8; COMPRESSED_KEY_LENGTH],
    chain_code: [u8; CHAIN_CODE_LENGTH],
}

impl ExtendedPublicKey {
    /// Create from a compressed public key and chain code
    ///
    /// Fails if the key is not a valid compressed secp256k1 point.
    pub fn new(
        public_key: [u8; COMPRESSED_KEY_LENGTH],
        chain_code: [u8; CHAIN_CODE_LENGTH],
    ) -> Result<Self, DerivationError> {
        PublicKey::from_sec1_bytes(&public_key).map_err(|_| DerivationError::DerivationFailed)?;
        Ok(Self {
            public_key,
            chain_code,
        })
    }

    /// Create from slices, checking their lengths
    pub fn from_slices(public_key: &[u8], chain_code: &[u8]) -> Result<Self, DerivationError> {
        let public_key = public_key
            .try_into()
            .map_err(|_| DerivationError::DerivationFailed)?;
        let chain_code = chain_code
            .try_into()
            .map_err(|_| DerivationError::DerivationFailed)?;
        Self::new(public_key, chain_code)
    }

    /// SEC1 compressed public key
    pub const fn compressed_public_key(&self) -> &[u8; COMPRESSED_KEY_LENGTH] {
        &self.public_key
    }

    /// BIP32 chain code
    pub const fn chain_code(&self) -> &[u8; CHAIN_CODE_LENGTH] {
        &self.chain_code
    }

    /// Derive the child key at a non-hardened node (CKDpub)
    pub fn derive_public_key(&self, node: DerivationNode) -> Result<Self, DerivationError> {
        if node.is_hardened() {
            return Err(DerivationError::HardenedNotSupported);
        }

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|_| DerivationError::DerivationFailed)?;
        mac.update(&self.public_key);
        mac.update(&node.index().to_be_bytes());
        let digest = mac.finalize().into_bytes();
        let (il, ir) = digest.split_at(32);

        // IL must be a valid scalar, i.e. below the curve order
        let tweak: Option<Scalar> = Scalar::from_repr(FieldBytes::clone_from_slice(il)).into();
        let tweak = tweak.ok_or(DerivationError::DerivationFailed)?;

        let parent = PublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|_| DerivationError::DerivationFailed)?;
        let child = ProjectivePoint::GENERATOR * tweak + parent.to_projective();
        let child = PublicKey::from_affine(AffinePoint::from(child))
            .map_err(|_| DerivationError::DerivationFailed)?;

        let encoded = child.to_encoded_point(true);
        let public_key = encoded
            .as_bytes()
            .try_into()
            .map_err(|_| DerivationError::DerivationFailed)?;
        let chain_code = ir
            .try_into()
            .map_err(|_| DerivationError::DerivationFailed)?;

        trace!(index = node.index(), "Derived child public key");
        Ok(Self {
            public_key,
            chain_code,
        })
    }

    /// Derive along a path, one node at a time from the left
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, DerivationError> {
        path.nodes()
            .iter()
            .try_fold(self.clone(), |key, node| key.derive_public_key(*node))
    }
}

impl std::fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedPublicKey")
            .field("public_key", &hex::encode(self.public_key))
            .field("chain_code", &hex::encode(self.chain_code))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xpub(key: &str, chain: &str) -> ExtendedPublicKey {
        ExtendedPublicKey::from_slices(&hex::decode(key).unwrap(), &hex::decode(chain).unwrap())
            .unwrap()
    }

    fn assert_key(key: &ExtendedPublicKey, public_key: &str, chain_code: &str) {
        assert_eq!(hex::encode(key.compressed_public_key()), public_key);
        assert_eq!(hex::encode(key.chain_code()), chain_code);
    }

    fn master() -> ExtendedPublicKey {
        xpub(
            "03cbcaa9c98c877a26977d00825c956a238e8dddfbd322cce4f74b0b5bd6ace4a7",
            "60499f801b896d83179a4374aeb7822aaeaceaa0db1f85ee3e904c4defbd9689",
        )
    }

    #[test]
    fn test_derive_single_node() {
        let parent = xpub(
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2",
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508",
        );
        let child = parent
            .derive_public_key(DerivationNode::NonHardened(1))
            .unwrap();
        assert_key(
            &child,
            "037c2098fd2235660734667ff8821dbbe0e6592d43cfd86b5dde9ea7c839b93a50",
            "8dd96414ff4d5b4750be3af7fecce207173f86d6b5f58f9366297180de8e109b",
        );
    }

    #[test]
    fn test_derive_paths() {
        let master = master();

        let child = master
            .derive_public_key(DerivationNode::NonHardened(0))
            .unwrap();
        assert_key(
            &child,
            "02fc9e5af0ac8d9b3cecfe2a888e2117ba3d089d8585886c9c826b6b22a98d12ea",
            "f0909affaa7ee7abe5dd4e100598d4dc53cd709d5a5c2cac40e7412f232f7c9c",
        );
        let single = master.derive_path(&"m/0".parse().unwrap()).unwrap();
        assert_eq!(single, child);

        let key = master.derive_path(&"m/0/1".parse().unwrap()).unwrap();
        assert_key(
            &key,
            "02d27a781fd1b3ec5ba5017ca55b9b900fde598459a0204597b37e6c66a0e35c98",
            "8d5e25bfe038e4ef37e2c5ec963b7a7c7a745b4319bff873fc40f1a52c7d6fd1",
        );

        let key = master.derive_path(&"m/44/60".parse().unwrap()).unwrap();
        assert_key(
            &key,
            "02c2fd0dc466bc05b0aadd14d933bf7ece3705af0846c471eaf16cf98c1341013d",
            "8bef790efd848a775aef08bbfd702dc8fe7fabaab2fcce473ddd8a9bd113aef1",
        );

        let key = master.derive_path(&"m/44/0/0/1/0".parse().unwrap()).unwrap();
        assert_key(
            &key,
            "02c2c9e694b2862b061acbe77bb926ac3e766cde72c7b4ac814b862c83fe80d239",
            "70009e1a12a32e3c106af696222dbdbd678278495fe3cd12eb4611965821f368",
        );
    }

    #[test]
    fn test_empty_path_is_identity() {
        let master = master();
        assert_eq!(master.derive_path(&DerivationPath::default()).unwrap(), master);
    }

    #[test]
    fn test_hardened_rejected() {
        let master = master();
        assert_eq!(
            master.derive_public_key(DerivationNode::Hardened(0)),
            Err(DerivationError::HardenedNotSupported)
        );
        for path in ["m/44'", "m/0/1'", "m/44'/0'/0'/1/0", "m/1/2/3'/4"] {
            assert_eq!(
                master.derive_path(&path.parse().unwrap()),
                Err(DerivationError::HardenedNotSupported),
                "{path}"
            );
        }
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert_eq!(
            ExtendedPublicKey::from_slices(&[0x05; 33], &[0; 32]),
            Err(DerivationError::DerivationFailed)
        );
        assert_eq!(
            ExtendedPublicKey::from_slices(&[0x02; 32], &[0; 32]),
            Err(DerivationError::DerivationFailed)
        );
    }
}
