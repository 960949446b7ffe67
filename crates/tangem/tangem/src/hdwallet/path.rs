use std::{fmt, str::FromStr};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{DerivationError, TlvDecode, TlvEncode};

/// Offset added to hardened indices
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

const HARDENED_SYMBOL: char = '\'';
const SEPARATOR: char = '/';
const MASTER: &str = "m";

/// A single step of a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationNode {
    Hardened(u32),
    NonHardened(u32),
}

impl DerivationNode {
    /// Decode a raw BIP32 index, the high bit marking hardened nodes
    pub const fn from_index(index: u32) -> Self {
        if index >= HARDENED_OFFSET {
            Self::Hardened(index - HARDENED_OFFSET)
        } else {
            Self::NonHardened(index)
        }
    }

    /// Raw BIP32 index including the hardened offset
    pub const fn index(&self) -> u32 {
        match self {
            Self::Hardened(index) => *index | HARDENED_OFFSET,
            Self::NonHardened(index) => *index,
        }
    }

    /// Index without the hardened offset
    pub const fn value(&self) -> u32 {
        match self {
            Self::Hardened(index) | Self::NonHardened(index) => *index,
        }
    }

    pub const fn is_hardened(&self) -> bool {
        matches!(self, Self::Hardened(_))
    }

    /// Same index, never hardened
    pub const fn to_non_hardened(self) -> Self {
        Self::NonHardened(self.value())
    }
}

impl FromStr for DerivationNode {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, hardened) = match s.strip_suffix(HARDENED_SYMBOL) {
            Some(digits) => (digits.trim_end(), true),
            None => (s, false),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DerivationError::WrongPath);
        }
        let index: u32 = digits.parse().map_err(|_| DerivationError::WrongPath)?;
        if index >= HARDENED_OFFSET {
            return Err(DerivationError::WrongPath);
        }

        Ok(if hardened {
            Self::Hardened(index)
        } else {
            Self::NonHardened(index)
        })
    }
}

impl fmt::Display for DerivationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardened(index) => write!(f, "{index}{HARDENED_SYMBOL}"),
            Self::NonHardened(index) => write!(f, "{index}"),
        }
    }
}

/// BIP32 derivation path such as `m/44'/0'/0'/1/0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath {
    nodes: Vec<DerivationNode>,
}

impl DerivationPath {
    /// Build a path from nodes
    pub const fn new(nodes: Vec<DerivationNode>) -> Self {
        Self { nodes }
    }

    /// Nodes from the root down
    pub fn nodes(&self) -> &[DerivationNode] {
        &self.nodes
    }

    /// Whether this is the master path `m`
    pub fn is_master(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any node needs the private key to derive
    pub fn has_hardened(&self) -> bool {
        self.nodes.iter().any(DerivationNode::is_hardened)
    }

    /// Extend the path with a node
    pub fn extend(&self, node: DerivationNode) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.push(node);
        Self { nodes }
    }

    /// The same indices with every node non-hardened
    pub fn to_non_hardened(&self) -> Self {
        Self {
            nodes: self.nodes.iter().map(|n| n.to_non_hardened()).collect(),
        }
    }

    /// Decode the binary form, four big-endian bytes per node
    pub fn from_bytes(data: &[u8]) -> Result<Self, DerivationError> {
        let (chunks, rest) = data.as_chunks::<4>();
        if !rest.is_empty() {
            return Err(DerivationError::WrongPath);
        }
        Ok(Self {
            nodes: chunks
                .iter()
                .map(|chunk| DerivationNode::from_index(u32::from_be_bytes(*chunk)))
                .collect(),
        })
    }

    /// Encode the binary form
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.nodes.len() * 4);
        for node in &self.nodes {
            buf.put_u32(node.index());
        }
        buf.freeze()
    }
}

impl From<Vec<DerivationNode>> for DerivationPath {
    fn from(nodes: Vec<DerivationNode>) -> Self {
        Self::new(nodes)
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split(SEPARATOR);
        let master = tokens.next().map(str::trim).ok_or(DerivationError::WrongPath)?;
        if !master.eq_ignore_ascii_case(MASTER) {
            return Err(DerivationError::WrongPath);
        }

        tokens
            .map(DerivationNode::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASTER)?;
        for node in &self.nodes {
            write!(f, "{SEPARATOR}{node}")?;
        }
        Ok(())
    }
}

impl TlvEncode for DerivationPath {
    fn encode_value(&self) -> Bytes {
        self.to_bytes()
    }
}

impl TlvDecode for DerivationPath {
    fn decode_value(value: &[u8]) -> Option<Self> {
        Self::from_bytes(value).ok()
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
