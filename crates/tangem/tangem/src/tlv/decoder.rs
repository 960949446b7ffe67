use tracing::trace;

use super::{Tlv, TlvDecode, TlvTag};
use crate::ProtocolError;

/// Typed access to decoded records
///
/// Lookups resolve to the first record with a matching tag. Absent fields
/// are distinguished from malformed ones: [`decode`](Self::decode) fails with
/// [`ProtocolError::MissingTag`] when a tag is missing, and every lookup fails
/// with [`ProtocolError::ConversionFailed`] when a value is present but invalid.
#[derive(Debug, Clone)]
pub struct TlvDecoder {
    tlvs: Vec<Tlv>,
}

impl TlvDecoder {
    /// Wrap already decoded records
    pub const fn new(tlvs: Vec<Tlv>) -> Self {
        Self { tlvs }
    }

    /// Decode records from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Tlv::deserialize(data).map(Self::new)
    }

    /// All records in wire order
    pub fn tlvs(&self) -> &[Tlv] {
        &self.tlvs
    }

    /// Whether a record with the tag is present
    pub fn contains(&self, tag: TlvTag) -> bool {
        self.find(tag).is_some()
    }

    /// Decode a mandatory field
    pub fn decode<T: TlvDecode>(&self, tag: TlvTag) -> Result<T, ProtocolError> {
        self.decode_optional(tag)?
            .ok_or(ProtocolError::MissingTag(tag))
    }

    /// Decode a field that may be absent
    pub fn decode_optional<T: TlvDecode>(&self, tag: TlvTag) -> Result<Option<T>, ProtocolError> {
        self.find(tag).map(convert).transpose()
    }

    /// Decode every record with the tag, in wire order
    pub fn decode_all<T: TlvDecode>(&self, tag: TlvTag) -> Result<Vec<T>, ProtocolError> {
        self.tlvs
            .iter()
            .filter(|tlv| tlv.tag == tag)
            .map(convert)
            .collect()
    }

    /// Decode a mandatory field rendered as an uppercase hex string
    pub fn decode_hex(&self, tag: TlvTag) -> Result<String, ProtocolError> {
        self.decode_hex_optional(tag)?
            .ok_or(ProtocolError::MissingTag(tag))
    }

    /// Decode an optional field rendered as an uppercase hex string
    pub fn decode_hex_optional(&self, tag: TlvTag) -> Result<Option<String>, ProtocolError> {
        Ok(self.find(tag).map(|tlv| hex::encode_upper(&tlv.value)))
    }

    fn find(&self, tag: TlvTag) -> Option<&Tlv> {
        self.tlvs.iter().find(|tlv| tlv.tag == tag)
    }
}

fn convert<T: TlvDecode>(tlv: &Tlv) -> Result<T, ProtocolError> {
    T::decode_value(&tlv.value).ok_or_else(|| {
        trace!(tag = ?tlv.tag, value = %hex::encode(&tlv.value), "TLV conversion failed");
        ProtocolError::ConversionFailed(tlv.tag)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::TlvBuilder;

    fn decoder() -> TlvDecoder {
        let bytes = TlvBuilder::new()
            .append_hex(TlvTag::CardId, "CB79000000018201")
            .unwrap()
            .append(TlvTag::IssuerName, "TANGEM SDK")
            .append(TlvTag::WalletIndex, 0u8)
            .append(TlvTag::WalletIndex, 2u8)
            .append(TlvTag::Pause, vec![0x01, 0x02, 0x03, 0x04, 0x05])
            .serialize()
            .unwrap();
        TlvDecoder::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_decode_present_and_absent() {
        let decoder = decoder();
        assert_eq!(decoder.decode_hex(TlvTag::CardId).unwrap(), "CB79000000018201");
        assert_eq!(decoder.decode::<String>(TlvTag::IssuerName).unwrap(), "TANGEM SDK");
        assert_eq!(decoder.decode_optional::<u32>(TlvTag::Status).unwrap(), None);
        assert_eq!(
            decoder.decode::<u32>(TlvTag::Status),
            Err(ProtocolError::MissingTag(TlvTag::Status))
        );
    }

    #[test]
    fn test_first_match_wins_and_multi_value() {
        let decoder = decoder();
        assert_eq!(decoder.decode::<u8>(TlvTag::WalletIndex).unwrap(), 0);
        assert_eq!(decoder.decode_all::<u8>(TlvTag::WalletIndex).unwrap(), vec![0, 2]);
        assert!(decoder.decode_all::<u8>(TlvTag::FileIndex).unwrap().is_empty());
    }

    #[test]
    fn test_present_but_invalid() {
        let decoder = decoder();
        assert_eq!(
            decoder.decode_optional::<u32>(TlvTag::Pause),
            Err(ProtocolError::ConversionFailed(TlvTag::Pause))
        );
    }
}
