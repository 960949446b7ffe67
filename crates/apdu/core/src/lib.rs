//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for working with smart card
//! APDU commands and responses according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! APDU (Application Protocol Data Unit) is the communication format used by smart cards.
//! This crate provides abstractions for:
//!
//! - Creating and parsing APDU commands and responses, including extended length payloads
//! - Talking to a card through an abstract, event-driven reader (NFC, BLE, PC/SC, ...)
//! - Error handling and status word interpretation
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod error;
pub mod response;
pub mod transport;

pub use command::{Command, ExpectedLength};
pub use error::{Error, TransportError};
pub use response::Response;
pub use response::status::StatusWord;
pub use transport::{CardReader, ReaderEvent};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut, Error, TransportError};

    pub use crate::Command;
    pub use crate::command::ExpectedLength;

    pub use crate::Response;
    pub use crate::response::status::StatusWord;

    pub use crate::transport::{CardReader, ReaderEvent};
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_reexports() {
        let cmd = Command::new(0x00, 0xF2, 0x00, 0x00);
        assert_eq!(cmd.cla, 0x00);
        assert_eq!(cmd.ins, 0xF2);

        let resp = Response::from_bytes(&[0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.payload(), &Bytes::from_static(&[0x01, 0x02, 0x03]));
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
    }
}
