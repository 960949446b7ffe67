//! APDU command definitions
//!
//! This module provides the generic command envelope according to ISO/IEC 7816-4,
//! including the extended length form (`00 Lc1 Lc2`) used by cards that exchange
//! payloads larger than 255 bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::Error;

/// Expected length type for APDU commands
pub type ExpectedLength = u16;

/// Largest payload that fits a short Lc byte
const SHORT_LC_MAX: usize = 0xFF;

/// Largest Le that fits a short Le byte (256 is encoded as `00`)
const SHORT_LE_MAX: ExpectedLength = 0x100;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
    /// Force the extended length form even for short payloads
    pub extended: bool,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
            extended: false,
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Always encode Lc/Le in the extended form
    pub const fn with_extended_length(mut self) -> Self {
        self.extended = true;
        self
    }

    /// Command payload, empty when absent
    pub fn payload(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Whether this command serializes with extended Lc/Le fields
    pub fn is_extended(&self) -> bool {
        self.extended
            || self.data.as_ref().is_some_and(|d| d.len() > SHORT_LC_MAX)
            || self.le.is_some_and(|le| le > SHORT_LE_MAX)
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        let extended = self.is_extended();
        let mut length = 4;

        if let Some(data) = self.data.as_ref().filter(|d| !d.is_empty()) {
            length += if extended { 3 } else { 1 } + data.len();
        }

        if self.le.is_some() {
            length += match (extended, self.has_data()) {
                (false, _) => 1,
                (true, true) => 2,
                (true, false) => 3,
            };
        }

        length
    }

    /// Convert to raw APDU bytes
    ///
    /// Fails with [`Error::PayloadTooLong`] when the payload does not fit the
    /// extended Lc field.
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        let extended = self.is_extended();
        let mut buffer = BytesMut::with_capacity(self.command_length());

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = self.data.as_ref().filter(|d| !d.is_empty()) {
            if extended {
                let lc = u16::try_from(data.len())
                    .map_err(|_| Error::PayloadTooLong(data.len()))?;
                buffer.put_u8(0x00);
                buffer.put_u16(lc);
            } else {
                let lc =
                    u8::try_from(data.len()).map_err(|_| Error::PayloadTooLong(data.len()))?;
                buffer.put_u8(lc);
            }
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            if extended {
                if !self.has_data() {
                    buffer.put_u8(0x00);
                }
                // 65536 is encoded as 00 00
                buffer.put_u16(le);
            } else {
                // 256 is encoded as 00
                buffer.put_u8(le as u8);
            }
        }

        Ok(buffer.freeze())
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        let body = &data[4..];

        match body {
            [] => {}
            [le] => command.le = Some(short_le(*le)),
            [0x00, hi, lo] => {
                command.extended = true;
                command.le = Some(u16::from_be_bytes([*hi, *lo]));
            }
            [0x00, hi, lo, rest @ ..] => {
                command.extended = true;
                let lc = u16::from_be_bytes([*hi, *lo]) as usize;
                command.data = Some(Bytes::copy_from_slice(
                    rest.get(..lc)
                        .ok_or(Error::InvalidCommandLength(data.len()))?,
                ));
                match &rest[lc..] {
                    [] => {}
                    [hi, lo] => command.le = Some(u16::from_be_bytes([*hi, *lo])),
                    _ => return Err(Error::InvalidCommandLength(data.len())),
                }
            }
            [lc, rest @ ..] => {
                let lc = *lc as usize;
                command.data = Some(Bytes::copy_from_slice(
                    rest.get(..lc)
                        .ok_or(Error::InvalidCommandLength(data.len()))?,
                ));
                match &rest[lc..] {
                    [] => {}
                    [le] => command.le = Some(short_le(*le)),
                    _ => return Err(Error::InvalidCommandLength(data.len())),
                }
            }
        }

        Ok(command)
    }

    fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_empty())
    }
}

const fn short_le(le: u8) -> ExpectedLength {
    if le == 0 { SHORT_LE_MAX } else { le as ExpectedLength }
}

impl TryFrom<&Command> for Bytes {
    type Error = Error;

    fn try_from(command: &Command) -> Result<Self, Error> {
        command.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn test_command_header_only() {
        let cmd = Command::new(0x00, 0xF2, 0x00, 0x00);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), h("00F20000").as_slice());
        assert_eq!(cmd.command_length(), 4);
    }

    #[test]
    fn test_short_command_with_data_and_le() {
        let cmd = Command::new_with_data(0x00, 0xA4, 0x04, 0x00, vec![0xA0, 0x00]).with_le(0);
        let bytes = cmd.to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), h("00A4040002A00000").as_slice());
        assert_eq!(bytes.len(), cmd.command_length());
    }

    #[test]
    fn test_extended_length_forced() {
        let cmd = Command::new_with_data(0x00, 0xF2, 0x00, 0x00, vec![0x01, 0x08])
            .with_extended_length();
        let bytes = cmd.to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), h("00F200000000020108").as_slice());
        assert_eq!(bytes.len(), cmd.command_length());
    }

    #[test]
    fn test_extended_length_large_payload() {
        let payload = vec![0xAB; 300];
        let cmd = Command::new_with_data(0x00, 0xD0, 0x00, 0x00, payload.clone());
        let bytes = cmd.to_bytes().unwrap();
        assert!(cmd.is_extended());
        assert_eq!(&bytes[4..7], &[0x00, 0x01, 0x2C]);
        assert_eq!(&bytes[7..], payload.as_slice());
    }

    #[test]
    fn test_from_bytes() {
        let short = Command::from_bytes(&h("00A4040002A00000")).unwrap();
        assert_eq!(short.data.as_deref(), Some(&[0xA0, 0x00][..]));
        assert_eq!(short.le, Some(256));

        let extended = Command::from_bytes(&h("00F20000000003010203")).unwrap();
        assert!(extended.extended);
        assert_eq!(extended.payload(), &[0x01, 0x02, 0x03]);
        assert_eq!(extended.le, None);

        assert!(matches!(
            Command::from_bytes(&h("00A404")),
            Err(Error::InvalidCommandLength(3))
        ));
        assert!(matches!(
            Command::from_bytes(&h("00A4040005A000")),
            Err(Error::InvalidCommandLength(7))
        ));
    }

    #[test]
    fn test_from_bytes_matches_to_bytes() {
        let cmd = Command::new_with_data(0x00, 0xFB, 0x00, 0x00, vec![0x11; 20])
            .with_extended_length();
        assert_eq!(Command::from_bytes(&cmd.to_bytes().unwrap()).unwrap(), cmd);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let largest = Command::new_with_data(0x00, 0xD0, 0x00, 0x00, vec![0x11; 0xFFFF]);
        let bytes = largest.to_bytes().unwrap();
        assert_eq!(&bytes[4..7], &[0x00, 0xFF, 0xFF]);
        assert_eq!(bytes.len(), largest.command_length());

        let oversized = Command::new_with_data(0x00, 0xD0, 0x00, 0x00, vec![0x11; 70_000]);
        assert!(matches!(
            oversized.to_bytes(),
            Err(Error::PayloadTooLong(70_000))
        ));
        assert!(Bytes::try_from(&oversized).is_err());
    }
}
