//! Tagged value model shared by bound parameters and result columns.
//!
//! # Wire layout
//!
//! ```text
//! +-----+-------------------------------------------+
//! | tag | body                                      |
//! +-----+-------------------------------------------+
//! |  0  | (none)                          Null      |
//! |  1  | 8 bytes, big-endian i64         Integer   |
//! |  2  | 8 bytes, big-endian f64 bits    Real      |
//! |  3  | u32 length + bytes              Text      |
//! |  4  | u32 length + bytes              Blob      |
//! +-----+-------------------------------------------+
//! ```
//!
//! Text lengths count bytes, not characters. Text is transported byte for
//! byte: invalid UTF-8 is passed through unchanged, so [`Value::Text`] holds
//! a `Vec<u8>` rather than a `String`.

use crate::error::{DecodeError, Result};
use crate::wire::{PayloadReader, PayloadWriter};

pub const TAG_NULL: u8 = 0;
pub const TAG_INTEGER: u8 = 1;
pub const TAG_REAL: u8 = 2;
pub const TAG_TEXT: u8 = 3;
pub const TAG_BLOB: u8 = 4;

/// A dynamically typed SQL value.
///
/// # Examples
///
/// ```
/// use sqinn_core::{PayloadReader, Value};
///
/// let value = Value::from("a");
/// let bytes = value.to_bytes();
/// assert_eq!(bytes, vec![3, 0, 0, 0, 1, b'a']);
///
/// let mut reader = PayloadReader::new(&bytes);
/// assert_eq!(Value::decode(&mut reader).unwrap(), value);
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit IEEE-754 floating point.
    Real(f64),
    /// Text as raw bytes (normally UTF-8, not validated).
    Text(Vec<u8>),
    /// Binary blob.
    Blob(Vec<u8>),
}

impl Value {
    /// Wire tag for this variant.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Null => TAG_NULL,
            Value::Integer(_) => TAG_INTEGER,
            Value::Real(_) => TAG_REAL,
            Value::Text(_) => TAG_TEXT,
            Value::Blob(_) => TAG_BLOB,
        }
    }

    /// Short type name used in log lines and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// Returns the text as `&str` when it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Decodes one tagged value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownTag`] for a tag outside the value model
    /// and [`DecodeError::UnexpectedEnd`] when the body is cut short.
    pub fn decode(reader: &mut PayloadReader<'_>) -> Result<Self> {
        let tag = reader.u8()?;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_INTEGER => Value::Integer(reader.i64()?),
            TAG_REAL => Value::Real(reader.f64()?),
            TAG_TEXT => Value::Text(reader.bytes()?.to_vec()),
            TAG_BLOB => Value::Blob(reader.bytes()?.to_vec()),
            other => return Err(DecodeError::UnknownTag(other)),
        };
        Ok(value)
    }

    /// Encodes this value; the exact inverse of [`Value::decode`].
    pub fn encode(&self, writer: &mut PayloadWriter) {
        writer.put_u8(self.tag());
        match self {
            Value::Null => {}
            Value::Integer(v) => writer.put_i64(*v),
            Value::Real(v) => writer.put_f64(*v),
            Value::Text(v) | Value::Blob(v) => writer.put_bytes(v),
        }
    }

    /// Encodes this value into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        self.encode(&mut writer);
        writer.into_bytes()
    }
}

/// Equality is bitwise for [`Value::Real`], so a NaN equals itself and
/// `0.0` differs from `-0.0`. This matches what survives the wire.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
