//! Field values and their fixed-width encoding.

use std::fmt;

use bytes::{Buf, BufMut};
use heapdb_common::constants::STRING_FIELD_LEN;
use heapdb_common::error::{DbError, DbResult};

use super::schema::FieldType;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// Integer value.
    Int(i32),
    /// String value.
    Str(String),
}

impl Value {
    /// Returns the type of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Int(_) => FieldType::Int,
            Value::Str(_) => FieldType::Str,
        }
    }

    /// Parses text as a value of `field_type`.
    pub fn parse(field_type: FieldType, text: &str) -> DbResult<Self> {
        match field_type {
            FieldType::Int => text
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|e| DbError::invalid_argument(format!("bad integer '{text}': {e}"))),
            FieldType::Str => Ok(Value::Str(text.to_string())),
        }
    }

    /// Writes the fixed-width encoding of this value.
    ///
    /// Strings longer than the payload are cut at the last char
    /// boundary that fits.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            Value::Int(v) => buf.put_i32(*v),
            Value::Str(s) => {
                let mut end = s.len().min(STRING_FIELD_LEN);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                buf.put_u32(end as u32);
                buf.put_slice(&s.as_bytes()[..end]);
                buf.put_bytes(0, STRING_FIELD_LEN - end);
            }
        }
    }

    /// Reads one value of `field_type`. Returns `None` if the bytes are
    /// not a valid encoding.
    ///
    /// The caller must ensure `buf` holds at least `field_type.width()`
    /// bytes.
    pub fn decode<B: Buf>(field_type: FieldType, buf: &mut B) -> Option<Self> {
        match field_type {
            FieldType::Int => Some(Value::Int(buf.get_i32())),
            FieldType::Str => {
                let len = buf.get_u32() as usize;
                let mut payload = [0u8; STRING_FIELD_LEN];
                buf.copy_to_slice(&mut payload);
                if len > STRING_FIELD_LEN {
                    return None;
                }
                String::from_utf8(payload[..len].to_vec())
                    .ok()
                    .map(Value::Str)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
