//! Matter-TLV encoding and decoding.
//!
//! The Interaction Model and the handshake messages carry their payloads as
//! Matter tag-length-value elements: a control byte (tag form in the high
//! three bits, element type in the low five), an optional one-byte context
//! tag, then the value. Containers (struct / array / list) nest until an
//! end-of-container marker.
//!
//! This codec supports the subset the stack speaks on the wire: anonymous
//! and one-byte context tags; signed and unsigned integers in all four
//! widths, booleans, floats, UTF-8 strings, octet strings, null, and the
//! three container kinds.
//!
//! # Example
//!
//! ```rust
//! use hearth_matter::tlv::{decode, TlvValue, TlvWriter};
//!
//! let mut w = TlvWriter::new();
//! w.start_struct(None);
//! w.octets(Some(1), &[0xAA; 4]);
//! w.unsigned(Some(2), 0x1234);
//! w.end_container().unwrap();
//! let bytes = w.finish().unwrap();
//!
//! let value = decode(&bytes).unwrap();
//! assert_eq!(value.field(2).and_then(TlvValue::as_u64), Some(0x1234));
//! ```

mod reader;
mod value;
mod writer;

pub use reader::decode;
pub use value::{TlvField, TlvValue};
pub use writer::TlvWriter;

/// Element types, low five bits of the control byte.
pub(crate) mod element {
    pub const INT_1: u8 = 0x00;
    pub const INT_2: u8 = 0x01;
    pub const INT_4: u8 = 0x02;
    pub const INT_8: u8 = 0x03;
    pub const UINT_1: u8 = 0x04;
    pub const UINT_2: u8 = 0x05;
    pub const UINT_4: u8 = 0x06;
    pub const UINT_8: u8 = 0x07;
    pub const BOOL_FALSE: u8 = 0x08;
    pub const BOOL_TRUE: u8 = 0x09;
    pub const FLOAT_4: u8 = 0x0A;
    pub const FLOAT_8: u8 = 0x0B;
    pub const UTF8_1: u8 = 0x0C;
    pub const UTF8_2: u8 = 0x0D;
    pub const UTF8_4: u8 = 0x0E;
    pub const OCTETS_1: u8 = 0x10;
    pub const OCTETS_2: u8 = 0x11;
    pub const OCTETS_4: u8 = 0x12;
    pub const NULL: u8 = 0x14;
    pub const STRUCT: u8 = 0x15;
    pub const ARRAY: u8 = 0x16;
    pub const LIST: u8 = 0x17;
    pub const END_CONTAINER: u8 = 0x18;
}

/// Tag controls, high three bits of the control byte.
pub(crate) mod tag_control {
    pub const ANONYMOUS: u8 = 0x00;
    pub const CONTEXT_1: u8 = 0x20;
    pub const MASK: u8 = 0xE0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrips() {
        let cases = [
            TlvValue::Unsigned(0),
            TlvValue::Unsigned(0xFF),
            TlvValue::Unsigned(0x1_0000),
            TlvValue::Unsigned(u64::MAX),
            TlvValue::Signed(-1),
            TlvValue::Signed(i64::MIN),
            TlvValue::Bool(true),
            TlvValue::Bool(false),
            TlvValue::Null,
            TlvValue::Octets(vec![1, 2, 3]),
            TlvValue::Utf8("on/off".into()),
        ];
        for value in cases {
            let bytes = value.encode();
            assert_eq!(decode(&bytes).unwrap(), value, "roundtrip of {value:?}");
        }
    }

    #[test]
    fn nested_containers_roundtrip() {
        let value = TlvValue::Struct(vec![
            TlvField::new(0, TlvValue::Array(vec![
                TlvValue::Unsigned(1),
                TlvValue::Unsigned(2),
            ])),
            TlvField::new(1, TlvValue::List(vec![
                TlvField::new(2, TlvValue::Unsigned(6)),
                TlvField::anonymous(TlvValue::Null),
            ])),
        ]);
        let bytes = value.encode();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn known_encoding_of_context_tagged_struct() {
        // {1: 0x2A (u8)}: struct, context tag 1, one-byte unsigned, end.
        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.unsigned(Some(1), 0x2A);
        w.end_container().unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(bytes, [0x15, 0x24, 0x01, 0x2A, 0x18]);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut bytes = TlvValue::Octets(vec![0; 16]).encode();
        bytes.truncate(bytes.len() - 1);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn missing_end_container_is_rejected() {
        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.unsigned(Some(1), 7);
        assert!(w.finish().is_err());
    }
}
