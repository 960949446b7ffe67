//! APDU response definitions
//!
//! This module provides the generic response envelope according to ISO/IEC 7816-4:
//! an optional payload followed by the two status bytes.

pub mod status;

use bytes::Bytes;
use tracing::trace;

use crate::Error;
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data, empty when the card only returned a status word
    payload: Bytes,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let Some((payload, sw)) = data.split_last_chunk::<2>() else {
            return Err(Error::IncompleteResponse(data.len()));
        };
        let status = StatusWord::new(sw[0], sw[1]);

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status,
        })
    }

    /// Response payload
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Split into payload and status word
    pub fn into_parts(self) -> (Bytes, StatusWord) {
        (self.payload, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let response = Response::from_bytes(&[0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();
        assert!(response.is_success());
        assert_eq!(response.payload().as_ref(), &[0x01, 0x02, 0x03]);

        let response = Response::from_bytes(&[0x6A, 0x82]).unwrap();
        assert!(!response.is_success());
        assert!(response.payload().is_empty());
        assert_eq!(response.status().to_u16(), 0x6A82);

        assert!(matches!(
            Response::from_bytes(&[0x90]),
            Err(Error::IncompleteResponse(1))
        ));
    }
}
