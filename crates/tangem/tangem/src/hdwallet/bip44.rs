use super::{DerivationNode, DerivationPath};

const PURPOSE: u32 = 44;

/// BIP44 change level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chain {
    /// Receiving addresses
    #[default]
    External,
    /// Change addresses
    Internal,
}

impl Chain {
    const fn index(self) -> u32 {
        match self {
            Self::External => 0,
            Self::Internal => 1,
        }
    }
}

/// Builder for `m/44'/coin_type'/account'/change/address_index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bip44 {
    pub coin_type: u32,
    pub account: u32,
    pub change: Chain,
    pub address_index: u32,
}

impl Bip44 {
    /// First external address of the first account
    pub const fn new(coin_type: u32) -> Self {
        Self {
            coin_type,
            account: 0,
            change: Chain::External,
            address_index: 0,
        }
    }

    pub fn build_path(&self) -> DerivationPath {
        DerivationPath::new(vec![
            DerivationNode::Hardened(PURPOSE),
            DerivationNode::Hardened(self.coin_type),
            DerivationNode::Hardened(self.account),
            DerivationNode::NonHardened(self.change.index()),
            DerivationNode::NonHardened(self.address_index),
        ])
    }
}
