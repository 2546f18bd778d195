//! Decoded element values.

use bytes::Bytes;

use crate::block::Block;
use crate::error::Result;
use crate::schema::ElementType;

/// Nanoseconds between the Unix epoch and the Matroska date origin,
/// 2001-01-01T00:00:00Z.
pub const MATROSKA_EPOCH_UNIX_NS: i64 = 978_307_200_000_000_000;

/// A decoded leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    /// Unsigned integers wider than 6 bytes, as lowercase hex.
    UnsignedHex(String),
    Signed(i64),
    Float(f64),
    /// Signed or float payload of an unsupported width.
    NotANumber,
    String(String),
    Utf8(String),
    /// Nanoseconds since 2001-01-01T00:00:00Z.
    Date(i64),
    Binary(Bytes),
    Block(Block),
    Unknown(Bytes),
}

impl Value {
    /// Decode a leaf payload according to its registry type.
    ///
    /// `simple` selects SimpleBlock semantics for `ElementType::Block`.
    pub fn decode(ty: ElementType, data: Bytes, simple: bool) -> Result<Self> {
        let value = match ty {
            ElementType::Unsigned => decode_unsigned(&data),
            ElementType::Signed => decode_signed(&data),
            ElementType::Float => decode_float(&data),
            ElementType::String => Value::String(decode_text(&data)),
            ElementType::Utf8 => Value::Utf8(decode_text(&data)),
            ElementType::Date => match <[u8; 8]>::try_from(&data[..]) {
                Ok(raw) => Value::Date(i64::from_be_bytes(raw)),
                Err(_) => Value::Binary(data),
            },
            ElementType::Binary => Value::Binary(data),
            ElementType::Block => Value::Block(Block::parse(data, simple)?),
            ElementType::Master | ElementType::Unknown => Value::Unknown(data),
        };
        Ok(value)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Unsigned(v) => Some(v),
            Value::Signed(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Signed(v) => Some(v),
            Value::Unsigned(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v),
            Value::Unsigned(v) => Some(v as f64),
            Value::Signed(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Utf8(s) | Value::UnsignedHex(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) | Value::Unknown(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Value::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Date as nanoseconds since the Unix epoch.
    pub fn as_unix_nanos(&self) -> Option<i64> {
        match *self {
            Value::Date(ns) => ns.checked_add(MATROSKA_EPOCH_UNIX_NS),
            _ => None,
        }
    }
}

fn decode_unsigned(data: &[u8]) -> Value {
    match data.len() {
        1 => Value::Unsigned(data[0] as u64),
        2 => Value::Unsigned(u16::from_be_bytes([data[0], data[1]]) as u64),
        4 => Value::Unsigned(u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64),
        0..=6 => Value::Unsigned(data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)),
        _ => Value::UnsignedHex(hex::encode(data)),
    }
}

fn decode_signed(data: &[u8]) -> Value {
    match data.len() {
        1 => Value::Signed(data[0] as i8 as i64),
        2 => Value::Signed(i16::from_be_bytes([data[0], data[1]]) as i64),
        4 => Value::Signed(i32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64),
        _ => Value::NotANumber,
    }
}

fn decode_float(data: &[u8]) -> Value {
    if let Ok(raw) = <[u8; 4]>::try_from(data) {
        Value::Float(f32::from_be_bytes(raw) as f64)
    } else if let Ok(raw) = <[u8; 8]>::try_from(data) {
        Value::Float(f64::from_be_bytes(raw))
    } else {
        Value::NotANumber
    }
}

// Strings may be zero-padded to their element size.
fn decode_text(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(ty: ElementType, data: &'static [u8]) -> Value {
        Value::decode(ty, Bytes::from_static(data), true).unwrap()
    }

    #[test]
    fn test_unsigned_widths() {
        assert_eq!(decode(ElementType::Unsigned, &[]), Value::Unsigned(0));
        assert_eq!(decode(ElementType::Unsigned, &[0x2A]), Value::Unsigned(42));
        assert_eq!(decode(ElementType::Unsigned, &[0x0F, 0x42, 0x40]), Value::Unsigned(1_000_000));
        assert_eq!(
            decode(ElementType::Unsigned, &[1, 2, 3, 4, 5, 6]),
            Value::Unsigned(0x0102_0304_0506)
        );
        assert_eq!(
            decode(ElementType::Unsigned, &[1, 2, 3, 4, 5, 6, 7]),
            Value::UnsignedHex("01020304050607".into())
        );
    }

    #[test]
    fn test_signed_widths() {
        assert_eq!(decode(ElementType::Signed, &[0xFF]), Value::Signed(-1));
        assert_eq!(decode(ElementType::Signed, &[0xFF, 0x38]), Value::Signed(-200));
        assert_eq!(decode(ElementType::Signed, &[0, 0, 1, 0]), Value::Signed(256));
        assert_eq!(decode(ElementType::Signed, &[0, 0, 1]), Value::NotANumber);
    }

    #[test]
    fn test_float_widths() {
        assert_eq!(decode(ElementType::Float, &[0x3F, 0x80, 0, 0]), Value::Float(1.0));
        assert_eq!(
            decode(ElementType::Float, &[0x40, 0x8F, 0x40, 0, 0, 0, 0, 0]),
            Value::Float(1000.0)
        );
        assert_eq!(decode(ElementType::Float, &[0x3F, 0x80]), Value::NotANumber);
    }

    #[test]
    fn test_text_trims_padding() {
        assert_eq!(
            decode(ElementType::String, b"webm\0\0"),
            Value::String("webm".into())
        );
        assert_eq!(
            decode(ElementType::Utf8, "Caf\u{e9}".as_bytes()),
            Value::Utf8("Caf\u{e9}".into())
        );
    }

    #[test]
    fn test_date() {
        let v = decode(ElementType::Date, &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(v, Value::Date(0));
        assert_eq!(v.as_unix_nanos(), Some(MATROSKA_EPOCH_UNIX_NS));
        assert_eq!(
            decode(ElementType::Date, &[1, 2]),
            Value::Binary(Bytes::from_static(&[1, 2]))
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Unsigned(7).as_u64(), Some(7));
        assert_eq!(Value::Signed(-7).as_u64(), None);
        assert_eq!(Value::Unsigned(7).as_f64(), Some(7.0));
        assert_eq!(Value::Utf8("x".into()).as_str(), Some("x"));
        assert!(Value::NotANumber.as_f64().is_none());
    }
}
