//! Tag-length-value codec used inside card payloads.
//!
//! Each record is a one byte tag followed by the value length and the value.
//! Lengths below `0xFF` take a single byte; longer values are announced with
//! `0xFF` followed by a two byte big-endian length.

mod builder;
mod decoder;
mod tag;
mod value;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

pub use builder::TlvBuilder;
pub use decoder::TlvDecoder;
pub use tag::TlvTag;
pub use value::{TlvDecode, TlvEncode};

use crate::ProtocolError;

/// Marker announcing a two byte length
const EXTENDED_LENGTH: u8 = 0xFF;

/// A single TLV record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    /// Record tag
    pub tag: TlvTag,
    /// Raw value
    pub value: Bytes,
}

impl Tlv {
    /// Create a new record
    pub fn new(tag: TlvTag, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Number of bytes this record occupies on the wire
    pub fn encoded_len(&self) -> usize {
        let header = if self.value.len() < EXTENDED_LENGTH as usize { 2 } else { 4 };
        header + self.value.len()
    }

    fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let len = self.value.len();
        buf.put_u8(self.tag.into());
        if len < EXTENDED_LENGTH as usize {
            buf.put_u8(len as u8);
        } else {
            let len = u16::try_from(len).map_err(|_| ProtocolError::ValueTooLong(len))?;
            buf.put_u8(EXTENDED_LENGTH);
            buf.put_u16(len);
        }
        buf.put_slice(&self.value);
        Ok(())
    }

    /// Serialize an ordered sequence of records
    pub fn serialize(tlvs: &[Self]) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(tlvs.iter().map(Self::encoded_len).sum());
        for tlv in tlvs {
            tlv.write_to(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Deserialize an ordered sequence of records
    ///
    /// Fails with [`ProtocolError::MalformedTlv`] if a header is cut short or a
    /// declared length runs past the end of the input.
    pub fn deserialize(data: &[u8]) -> Result<Vec<Self>, ProtocolError> {
        let mut tlvs = Vec::new();
        let mut rest = data;

        while let Some((&tag, tail)) = rest.split_first() {
            let (len, tail) = match tail {
                [EXTENDED_LENGTH, hi, lo, tail @ ..] => (u16::from_be_bytes([*hi, *lo]) as usize, tail),
                [EXTENDED_LENGTH, ..] => return Err(ProtocolError::MalformedTlv),
                [len, tail @ ..] => (*len as usize, tail),
                [] => return Err(ProtocolError::MalformedTlv),
            };

            if len > tail.len() {
                trace!(tag, len, remaining = tail.len(), "TLV length exceeds buffer");
                return Err(ProtocolError::MalformedTlv);
            }

            let (value, tail) = tail.split_at(len);
            let tlv = Self::new(TlvTag::from(tag), Bytes::copy_from_slice(value));
            trace!(tag = ?tlv.tag, value = %hex::encode(value), "Decoded TLV");
            tlvs.push(tlv);
            rest = tail;
        }

        Ok(tlvs)
    }
}

impl fmt::Display for Tlv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [0x{:02X}:{}]: {}",
            self.tag,
            u8::from(self.tag),
            self.value.len(),
            hex::encode_upper(&self.value)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_short_and_long_lengths() {
        let tlvs = vec![
            Tlv::new(TlvTag::CardId, vec![0xCB, 0x79]),
            Tlv::new(TlvTag::FileData, vec![0x00; 300]),
        ];
        let bytes = Tlv::serialize(&tlvs).unwrap();

        assert_eq!(&bytes[..4], &[0x01, 0x02, 0xCB, 0x79]);
        assert_eq!(&bytes[4..8], &[0x28, 0xFF, 0x01, 0x2C]);
        assert_eq!(bytes.len(), 4 + 4 + 300);
        assert_eq!(Tlv::deserialize(&bytes).unwrap(), tlvs);
    }

    #[test]
    fn test_boundary_length_uses_extended_form() {
        let tlv = Tlv::new(TlvTag::FileData, vec![0x11; 0xFF]);
        let bytes = Tlv::serialize(std::slice::from_ref(&tlv)).unwrap();
        assert_eq!(&bytes[..4], &[0x28, 0xFF, 0x00, 0xFF]);
        assert_eq!(tlv.encoded_len(), bytes.len());
    }

    #[test]
    fn test_unknown_tags_round_trip() {
        let data = hex::decode("EE03010203010101").unwrap();
        let tlvs = Tlv::deserialize(&data).unwrap();
        assert_eq!(tlvs[0].tag, TlvTag::Unknown(0xEE));
        assert_eq!(tlvs[1].tag, TlvTag::CardId);
        assert_eq!(Tlv::serialize(&tlvs).unwrap().as_ref(), data.as_slice());
    }

    #[test]
    fn test_truncated_payloads_fail() {
        // declared length 4, only 2 bytes left
        assert_eq!(
            Tlv::deserialize(&[0x01, 0x04, 0xAA, 0xBB]),
            Err(ProtocolError::MalformedTlv)
        );
        // tag without length
        assert_eq!(Tlv::deserialize(&[0x01]), Err(ProtocolError::MalformedTlv));
        // extended marker without length bytes
        assert_eq!(
            Tlv::deserialize(&[0x01, 0xFF, 0x00]),
            Err(ProtocolError::MalformedTlv)
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(Tlv::deserialize(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_value_too_long() {
        let tlv = Tlv::new(TlvTag::FileData, vec![0u8; 0x1_0000]);
        assert_eq!(
            Tlv::serialize(&[tlv]),
            Err(ProtocolError::ValueTooLong(0x1_0000))
        );
    }
}
