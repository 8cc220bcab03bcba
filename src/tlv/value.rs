//! Owned TLV value tree.

use super::writer::TlvWriter;

/// A decoded TLV element, owned.
#[derive(Debug, Clone, PartialEq)]
pub enum TlvValue {
    /// Unsigned integer, any wire width.
    Unsigned(u64),
    /// Signed integer, any wire width.
    Signed(i64),
    /// Boolean.
    Bool(bool),
    /// Floating point (single precision widened on decode).
    Float(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Octet string.
    Octets(Vec<u8>),
    /// Null.
    Null,
    /// Structure: tagged members, order preserved.
    Struct(Vec<TlvField>),
    /// Array: anonymous members.
    Array(Vec<TlvValue>),
    /// List: members with optional tags.
    List(Vec<TlvField>),
}

/// A container member: optional context tag plus value.
#[derive(Debug, Clone, PartialEq)]
pub struct TlvField {
    /// One-byte context tag, `None` for anonymous members.
    pub tag: Option<u8>,
    /// Member value.
    pub value: TlvValue,
}

impl TlvField {
    /// Context-tagged member.
    pub fn new(tag: u8, value: TlvValue) -> Self {
        Self { tag: Some(tag), value }
    }

    /// Anonymous member.
    pub fn anonymous(value: TlvValue) -> Self {
        Self { tag: None, value }
    }
}

impl TlvValue {
    /// Encode as a single anonymous top-level element.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = TlvWriter::new();
        writer.value(None, self);
        // A complete value tree cannot leave a container open.
        writer.finish().expect("value tree is balanced")
    }

    /// Unsigned accessor; accepts non-negative signed elements too, since
    /// peers may pick either representation for small integers.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TlvValue::Unsigned(v) => Some(*v),
            TlvValue::Signed(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Signed accessor; accepts unsigned elements that fit.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TlvValue::Signed(v) => Some(*v),
            TlvValue::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Boolean accessor.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TlvValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Octet-string accessor.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TlvValue::Octets(v) => Some(v),
            _ => None,
        }
    }

    /// String accessor.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TlvValue::Utf8(v) => Some(v),
            _ => None,
        }
    }

    /// Container members, for structs and lists.
    pub fn fields(&self) -> Option<&[TlvField]> {
        match self {
            TlvValue::Struct(fields) | TlvValue::List(fields) => Some(fields),
            _ => None,
        }
    }

    /// Array members.
    pub fn items(&self) -> Option<&[TlvValue]> {
        match self {
            TlvValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// First member of a struct or list carrying `tag`.
    pub fn field(&self, tag: u8) -> Option<&TlvValue> {
        self.fields()?
            .iter()
            .find(|f| f.tag == Some(tag))
            .map(|f| &f.value)
    }
}
