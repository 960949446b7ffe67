use bytes::Bytes;

use crate::{ProtocolError, TlvBuilder, TlvDecode, TlvDecoder, TlvEncode, TlvTag};

/// Who can read a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileVisibility {
    /// Readable without the access code
    Public,
    /// Readable only after the access code was verified
    #[default]
    Private,
}

/// Settings attached to a card file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileSettings {
    pub is_permanent: bool,
    pub visibility: FileVisibility,
}

impl FileSettings {
    const PUBLIC: u8 = 0x01;
    const PERMANENT: u8 = 0x02;
}

impl TlvEncode for FileSettings {
    fn encode_value(&self) -> Bytes {
        let mut mask = 0;
        if self.visibility == FileVisibility::Public {
            mask |= Self::PUBLIC;
        }
        if self.is_permanent {
            mask |= Self::PERMANENT;
        }
        Bytes::copy_from_slice(&[mask])
    }
}

impl TlvDecode for FileSettings {
    fn decode_value(value: &[u8]) -> Option<Self> {
        let mask = u8::decode_value(value)?;
        Some(Self {
            is_permanent: mask & Self::PERMANENT != 0,
            visibility: if mask & Self::PUBLIC != 0 {
                FileVisibility::Public
            } else {
                FileVisibility::Private
            },
        })
    }
}

/// A file stored on the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub data: Vec<u8>,
    pub index: u32,
    pub settings: FileSettings,
}

impl File {
    /// Decode a read file response, `None` when the slot is empty
    pub fn from_decoder(decoder: &TlvDecoder) -> Result<Option<Self>, ProtocolError> {
        let Some(data) = decoder.decode_optional::<Vec<u8>>(TlvTag::FileData)? else {
            return Ok(None);
        };
        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            data,
            index: decoder.decode(TlvTag::FileIndex)?,
            settings: decoder
                .decode_optional(TlvTag::FileSettings)?
                .unwrap_or_default(),
        }))
    }

    /// Interpret the data as a [`NamedFile`], if it is one
    pub fn named(&self) -> Option<NamedFile> {
        NamedFile::from_tlv_data(&self.data).ok()
    }
}

/// A named, optionally signed payload stored inside a [`File`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedFile {
    pub name: String,
    pub payload: Vec<u8>,
    pub counter: Option<u32>,
    pub signature: Option<Vec<u8>>,
}

impl NamedFile {
    /// Create an unsigned named file
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            counter: None,
            signature: None,
        }
    }

    /// Decode from file data
    pub fn from_tlv_data(data: &[u8]) -> Result<Self, ProtocolError> {
        let decoder = TlvDecoder::from_bytes(data)?;
        Ok(Self {
            name: decoder.decode(TlvTag::FileTypeName)?,
            payload: decoder.decode(TlvTag::FileData)?,
            counter: decoder.decode_optional(TlvTag::FileCounter)?,
            signature: decoder.decode_optional(TlvTag::FileSignature)?,
        })
    }

    /// Encode to file data
    pub fn serialize(&self) -> Result<Bytes, ProtocolError> {
        TlvBuilder::new()
            .append(TlvTag::FileTypeName, self.name.as_str())
            .append(TlvTag::FileData, self.payload.as_slice())
            .append_optional(TlvTag::FileCounter, self.counter)
            .append_optional(TlvTag::FileSignature, self.signature.as_deref())
            .serialize()
    }
}
