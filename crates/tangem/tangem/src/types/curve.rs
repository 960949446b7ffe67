use std::str::FromStr;

use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{TlvDecode, TlvEncode};

/// Elliptic curves supported by the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EllipticCurve {
    #[display("secp256k1")]
    Secp256k1,
    #[display("ed25519")]
    Ed25519,
    #[display("secp256r1")]
    Secp256r1,
}

impl EllipticCurve {
    /// All curves, in the order the card enumerates them
    pub const ALL: [Self; 3] = [Self::Secp256k1, Self::Ed25519, Self::Secp256r1];
}

impl FromStr for EllipticCurve {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|curve| curve.to_string().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl TlvEncode for EllipticCurve {
    fn encode_value(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl TlvDecode for EllipticCurve {
    fn decode_value(value: &[u8]) -> Option<Self> {
        String::decode_value(value)?.parse().ok()
    }
}
