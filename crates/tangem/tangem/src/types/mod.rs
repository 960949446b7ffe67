//! Card, wallet and file models decoded from card responses.

mod card;
mod curve;
mod file;
mod user_code;
mod wallet;

pub use card::{BackupStatus, Card, CardSettings, FirmwareType, FirmwareVersion, Issuer};
pub use curve::EllipticCurve;
pub use file::{File, FileSettings, FileVisibility, NamedFile};
pub use user_code::{UserCode, UserCodeType};
pub use wallet::{Wallet, WalletSettings, WalletStatus};

#[cfg(test)]
pub(crate) use card::tests::{test_card, test_wallet};
