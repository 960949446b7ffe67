use derive_more::Display;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Kind of user code protecting the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UserCodeType {
    /// Code required for every interaction
    #[display("access code")]
    AccessCode,
    /// Code required for signing and wallet management
    #[display("passcode")]
    Passcode,
}

impl UserCodeType {
    /// Factory default code
    pub const fn default_value(&self) -> &'static str {
        match self {
            Self::AccessCode => "000000",
            Self::Passcode => "000",
        }
    }
}

/// A user code as it crosses into protocol payloads
///
/// Only the SHA-256 hash of the entered code is kept.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct UserCode {
    #[zeroize(skip)]
    kind: UserCodeType,
    value: Option<[u8; 32]>,
}

impl UserCode {
    /// Hash an entered code
    pub fn new(kind: UserCodeType, code: &str) -> Self {
        Self::from_bytes(kind, code.as_bytes())
    }

    /// Hash raw code bytes
    pub fn from_bytes(kind: UserCodeType, code: &[u8]) -> Self {
        Self {
            kind,
            value: Some(Sha256::digest(code).into()),
        }
    }

    /// A code with no known value
    pub const fn unset(kind: UserCodeType) -> Self {
        Self { kind, value: None }
    }

    /// The factory default code
    pub fn default_for(kind: UserCodeType) -> Self {
        Self::new(kind, kind.default_value())
    }

    /// Kind of code
    pub const fn kind(&self) -> UserCodeType {
        self.kind
    }

    /// SHA-256 of the code, if known
    pub const fn value(&self) -> Option<&[u8; 32]> {
        self.value.as_ref()
    }

    /// Hash to send to the card, falling back to the factory default
    pub fn value_or_default(&self) -> [u8; 32] {
        self.value
            .unwrap_or_else(|| Sha256::digest(self.kind.default_value()).into())
    }

    /// Whether this is the factory default code
    pub fn is_default(&self) -> bool {
        self.value_or_default() == <[u8; 32]>::from(Sha256::digest(self.kind.default_value()))
    }
}

impl std::fmt::Debug for UserCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCode")
            .field("kind", &self.kind)
            .field("is_set", &self.value.is_some())
            .finish()
    }
}
