use bytes::Bytes;

use super::{Tlv, TlvEncode, TlvTag};
use crate::ProtocolError;

/// Builder for the TLV payload of a command
#[derive(Debug, Clone, Default)]
pub struct TlvBuilder {
    tlvs: Vec<Tlv>,
}

impl TlvBuilder {
    /// Create an empty builder
    pub const fn new() -> Self {
        Self { tlvs: Vec::new() }
    }

    /// Append a value
    pub fn append(mut self, tag: TlvTag, value: impl TlvEncode) -> Self {
        self.tlvs.push(Tlv::new(tag, value.encode_value()));
        self
    }

    /// Append a value if present
    pub fn append_optional(self, tag: TlvTag, value: Option<impl TlvEncode>) -> Self {
        match value {
            Some(value) => self.append(tag, value),
            None => self,
        }
    }

    /// Append a hex string as raw bytes (card ids)
    pub fn append_hex(mut self, tag: TlvTag, value: &str) -> Result<Self, ProtocolError> {
        let bytes = hex::decode(value).map_err(|_| ProtocolError::ConversionFailed(tag))?;
        self.tlvs.push(Tlv::new(tag, bytes));
        Ok(self)
    }

    /// Append a pre-built record
    pub fn append_tlv(mut self, tlv: Tlv) -> Self {
        self.tlvs.push(tlv);
        self
    }

    /// Records appended so far
    pub fn tlvs(&self) -> &[Tlv] {
        &self.tlvs
    }

    /// Serialize the records in insertion order
    pub fn serialize(&self) -> Result<Bytes, ProtocolError> {
        Tlv::serialize(&self.tlvs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let bytes = TlvBuilder::new()
            .append_hex(TlvTag::CardId, "cb79000000018201")
            .unwrap()
            .append(TlvTag::WalletIndex, 1u8)
            .append_optional(TlvTag::Cvc, None::<&[u8]>)
            .append_optional(TlvTag::Pause, Some(5u16))
            .serialize()
            .unwrap();

        assert_eq!(
            hex::encode_upper(&bytes),
            "0108CB790000000182016501011C020005"
        );
    }

    #[test]
    fn test_append_hex_rejects_garbage() {
        assert_eq!(
            TlvBuilder::new().append_hex(TlvTag::CardId, "zz").unwrap_err(),
            ProtocolError::ConversionFailed(TlvTag::CardId)
        );
    }
}
