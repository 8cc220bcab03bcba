//! TLV decoding into an owned value tree.

use crate::core::TlvError;

use super::element;
use super::tag_control;
use super::value::{TlvField, TlvValue};

/// Decode a single top-level TLV element, requiring full input consumption.
pub fn decode(bytes: &[u8]) -> Result<TlvValue, TlvError> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    let (_, value) = reader.read_element()?;
    if reader.pos != bytes.len() {
        return Err(TlvError::UnbalancedContainer);
    }
    Ok(value)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], TlvError> {
        if self.pos + n > self.buf.len() {
            return Err(TlvError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, TlvError> {
        Ok(self.take(1)?[0])
    }

    fn length(&mut self, width: usize) -> Result<usize, TlvError> {
        let raw = self.take(width)?;
        let mut len = 0usize;
        for (i, b) in raw.iter().enumerate() {
            len |= (*b as usize) << (8 * i);
        }
        Ok(len)
    }

    /// Read one complete element. End-of-container bytes never reach this
    /// function; [`Reader::read_container`] consumes them.
    fn read_element(&mut self) -> Result<(Option<u8>, TlvValue), TlvError> {
        let control = self.byte()?;
        let tag = self.read_tag(control)?;
        let value = self.read_value(control & !tag_control::MASK)?;
        Ok((tag, value))
    }

    fn read_tag(&mut self, control: u8) -> Result<Option<u8>, TlvError> {
        match control & tag_control::MASK {
            tag_control::ANONYMOUS => Ok(None),
            tag_control::CONTEXT_1 => Ok(Some(self.byte()?)),
            _ => Err(TlvError::UnsupportedTag(control)),
        }
    }

    fn read_value(&mut self, element_type: u8) -> Result<TlvValue, TlvError> {
        let value = match element_type {
            element::INT_1 => TlvValue::Signed(self.byte()? as i8 as i64),
            element::INT_2 => {
                let raw: [u8; 2] = self.take(2)?.try_into().unwrap();
                TlvValue::Signed(i16::from_le_bytes(raw) as i64)
            }
            element::INT_4 => {
                let raw: [u8; 4] = self.take(4)?.try_into().unwrap();
                TlvValue::Signed(i32::from_le_bytes(raw) as i64)
            }
            element::INT_8 => {
                let raw: [u8; 8] = self.take(8)?.try_into().unwrap();
                TlvValue::Signed(i64::from_le_bytes(raw))
            }
            element::UINT_1 => TlvValue::Unsigned(self.byte()? as u64),
            element::UINT_2 => {
                let raw: [u8; 2] = self.take(2)?.try_into().unwrap();
                TlvValue::Unsigned(u16::from_le_bytes(raw) as u64)
            }
            element::UINT_4 => {
                let raw: [u8; 4] = self.take(4)?.try_into().unwrap();
                TlvValue::Unsigned(u32::from_le_bytes(raw) as u64)
            }
            element::UINT_8 => {
                let raw: [u8; 8] = self.take(8)?.try_into().unwrap();
                TlvValue::Unsigned(u64::from_le_bytes(raw))
            }
            element::BOOL_FALSE => TlvValue::Bool(false),
            element::BOOL_TRUE => TlvValue::Bool(true),
            element::FLOAT_4 => {
                let raw: [u8; 4] = self.take(4)?.try_into().unwrap();
                TlvValue::Float(f32::from_le_bytes(raw) as f64)
            }
            element::FLOAT_8 => {
                let raw: [u8; 8] = self.take(8)?.try_into().unwrap();
                TlvValue::Float(f64::from_le_bytes(raw))
            }
            element::UTF8_1 | element::UTF8_2 | element::UTF8_4 => {
                let width = 1 << (element_type - element::UTF8_1);
                let len = self.length(width)?;
                let raw = self.take(len)?;
                let text = std::str::from_utf8(raw).map_err(|_| TlvError::InvalidUtf8)?;
                TlvValue::Utf8(text.to_owned())
            }
            element::OCTETS_1 | element::OCTETS_2 | element::OCTETS_4 => {
                let width = 1 << (element_type - element::OCTETS_1);
                let len = self.length(width)?;
                TlvValue::Octets(self.take(len)?.to_vec())
            }
            element::NULL => TlvValue::Null,
            element::STRUCT => TlvValue::Struct(self.read_container()?),
            element::ARRAY => {
                let fields = self.read_container()?;
                TlvValue::Array(fields.into_iter().map(|f| f.value).collect())
            }
            element::LIST => TlvValue::List(self.read_container()?),
            other => return Err(TlvError::UnknownType(other)),
        };
        Ok(value)
    }

    fn read_container(&mut self) -> Result<Vec<TlvField>, TlvError> {
        let mut fields = Vec::new();
        loop {
            let control = match self.buf.get(self.pos) {
                Some(c) => *c,
                None => return Err(TlvError::UnterminatedContainer),
            };
            if control == element::END_CONTAINER {
                self.pos += 1;
                return Ok(fields);
            }
            let (tag, value) = self.read_element()?;
            fields.push(TlvField { tag, value });
        }
    }
}
