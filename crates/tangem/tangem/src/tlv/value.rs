//! Conversions between Rust values and TLV value bytes.

use bytes::Bytes;

/// A value that can be written into a TLV record
pub trait TlvEncode {
    /// Encode the value bytes
    fn encode_value(&self) -> Bytes;
}

/// A value that can be read out of a TLV record
pub trait TlvDecode: Sized {
    /// Decode the value bytes, `None` if they are malformed for this type
    fn decode_value(value: &[u8]) -> Option<Self>;
}

impl<T: TlvEncode + ?Sized> TlvEncode for &T {
    fn encode_value(&self) -> Bytes {
        (**self).encode_value()
    }
}

macro_rules! impl_int {
    ($($ty:ty),*) => {$(
        impl TlvEncode for $ty {
            fn encode_value(&self) -> Bytes {
                Bytes::copy_from_slice(&self.to_be_bytes())
            }
        }

        impl TlvDecode for $ty {
            /// Big-endian of any length, as long as the value fits.
            fn decode_value(value: &[u8]) -> Option<Self> {
                if value.is_empty() {
                    return None;
                }
                let start = value.iter().position(|b| *b != 0).unwrap_or(value.len());
                let significant = &value[start..];
                if significant.len() > size_of::<$ty>() {
                    return None;
                }
                let mut buf = [0u8; size_of::<$ty>()];
                buf[size_of::<$ty>() - significant.len()..].copy_from_slice(significant);
                Some(<$ty>::from_be_bytes(buf))
            }
        }
    )*};
}

impl_int!(u8, u16, u32, u64);

impl TlvEncode for bool {
    fn encode_value(&self) -> Bytes {
        Bytes::copy_from_slice(&[u8::from(*self)])
    }
}

impl TlvDecode for bool {
    fn decode_value(value: &[u8]) -> Option<Self> {
        match value {
            [] => Some(true),
            [b] => Some(*b != 0),
            _ => None,
        }
    }
}

impl TlvEncode for str {
    fn encode_value(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl TlvEncode for String {
    fn encode_value(&self) -> Bytes {
        self.as_str().encode_value()
    }
}

impl TlvDecode for String {
    fn decode_value(value: &[u8]) -> Option<Self> {
        let end = value.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        std::str::from_utf8(&value[..end]).ok().map(str::to_owned)
    }
}

impl TlvEncode for [u8] {
    fn encode_value(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl TlvEncode for Vec<u8> {
    fn encode_value(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl TlvDecode for Vec<u8> {
    fn decode_value(value: &[u8]) -> Option<Self> {
        Some(value.to_vec())
    }
}

impl TlvEncode for Bytes {
    fn encode_value(&self) -> Bytes {
        self.clone()
    }
}

impl TlvDecode for Bytes {
    fn decode_value(value: &[u8]) -> Option<Self> {
        Some(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> TlvEncode for [u8; N] {
    fn encode_value(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> TlvDecode for [u8; N] {
    fn decode_value(value: &[u8]) -> Option<Self> {
        value.try_into().ok()
    }
}
