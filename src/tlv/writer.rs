//! Streaming TLV writer.

use crate::core::TlvError;

use super::element;
use super::tag_control;
use super::value::{TlvField, TlvValue};

/// Appends TLV elements to a growing buffer.
///
/// Containers are opened with `start_*` and must be closed with
/// [`TlvWriter::end_container`]; [`TlvWriter::finish`] rejects unbalanced
/// output.
#[derive(Debug, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
    open_containers: usize,
}

impl TlvWriter {
    /// Fresh writer.
    pub fn new() -> Self {
        Self::default()
    }

    fn control(&mut self, tag: Option<u8>, element_type: u8) {
        match tag {
            None => self.buf.push(tag_control::ANONYMOUS | element_type),
            Some(t) => {
                self.buf.push(tag_control::CONTEXT_1 | element_type);
                self.buf.push(t);
            }
        }
    }

    /// Unsigned integer, minimal wire width.
    pub fn unsigned(&mut self, tag: Option<u8>, value: u64) {
        if value <= u8::MAX as u64 {
            self.control(tag, element::UINT_1);
            self.buf.push(value as u8);
        } else if value <= u16::MAX as u64 {
            self.control(tag, element::UINT_2);
            self.buf.extend_from_slice(&(value as u16).to_le_bytes());
        } else if value <= u32::MAX as u64 {
            self.control(tag, element::UINT_4);
            self.buf.extend_from_slice(&(value as u32).to_le_bytes());
        } else {
            self.control(tag, element::UINT_8);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Signed integer, minimal wire width.
    pub fn signed(&mut self, tag: Option<u8>, value: i64) {
        if let Ok(v) = i8::try_from(value) {
            self.control(tag, element::INT_1);
            self.buf.extend_from_slice(&v.to_le_bytes());
        } else if let Ok(v) = i16::try_from(value) {
            self.control(tag, element::INT_2);
            self.buf.extend_from_slice(&v.to_le_bytes());
        } else if let Ok(v) = i32::try_from(value) {
            self.control(tag, element::INT_4);
            self.buf.extend_from_slice(&v.to_le_bytes());
        } else {
            self.control(tag, element::INT_8);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Boolean.
    pub fn bool(&mut self, tag: Option<u8>, value: bool) {
        let ty = if value { element::BOOL_TRUE } else { element::BOOL_FALSE };
        self.control(tag, ty);
    }

    /// Double-precision float.
    pub fn float(&mut self, tag: Option<u8>, value: f64) {
        self.control(tag, element::FLOAT_8);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Octet string, minimal length-field width.
    pub fn octets(&mut self, tag: Option<u8>, value: &[u8]) {
        if value.len() <= u8::MAX as usize {
            self.control(tag, element::OCTETS_1);
            self.buf.push(value.len() as u8);
        } else if value.len() <= u16::MAX as usize {
            self.control(tag, element::OCTETS_2);
            self.buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
        } else {
            self.control(tag, element::OCTETS_4);
            self.buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        }
        self.buf.extend_from_slice(value);
    }

    /// UTF-8 string, minimal length-field width.
    pub fn utf8(&mut self, tag: Option<u8>, value: &str) {
        let bytes = value.as_bytes();
        if bytes.len() <= u8::MAX as usize {
            self.control(tag, element::UTF8_1);
            self.buf.push(bytes.len() as u8);
        } else if bytes.len() <= u16::MAX as usize {
            self.control(tag, element::UTF8_2);
            self.buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        } else {
            self.control(tag, element::UTF8_4);
            self.buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Null element.
    pub fn null(&mut self, tag: Option<u8>) {
        self.control(tag, element::NULL);
    }

    /// Open a structure.
    pub fn start_struct(&mut self, tag: Option<u8>) {
        self.control(tag, element::STRUCT);
        self.open_containers += 1;
    }

    /// Open an array.
    pub fn start_array(&mut self, tag: Option<u8>) {
        self.control(tag, element::ARRAY);
        self.open_containers += 1;
    }

    /// Open a list.
    pub fn start_list(&mut self, tag: Option<u8>) {
        self.control(tag, element::LIST);
        self.open_containers += 1;
    }

    /// Close the innermost open container.
    pub fn end_container(&mut self) -> Result<(), TlvError> {
        if self.open_containers == 0 {
            return Err(TlvError::UnbalancedContainer);
        }
        self.open_containers -= 1;
        self.buf.push(element::END_CONTAINER);
        Ok(())
    }

    /// Write a whole value tree under one tag.
    pub fn value(&mut self, tag: Option<u8>, value: &TlvValue) {
        match value {
            TlvValue::Unsigned(v) => self.unsigned(tag, *v),
            TlvValue::Signed(v) => self.signed(tag, *v),
            TlvValue::Bool(v) => self.bool(tag, *v),
            TlvValue::Float(v) => self.float(tag, *v),
            TlvValue::Utf8(v) => self.utf8(tag, v),
            TlvValue::Octets(v) => self.octets(tag, v),
            TlvValue::Null => self.null(tag),
            TlvValue::Struct(fields) => {
                self.start_struct(tag);
                self.write_fields(fields);
                let _ = self.end_container();
            }
            TlvValue::Array(items) => {
                self.start_array(tag);
                for item in items {
                    self.value(None, item);
                }
                let _ = self.end_container();
            }
            TlvValue::List(fields) => {
                self.start_list(tag);
                self.write_fields(fields);
                let _ = self.end_container();
            }
        }
    }

    fn write_fields(&mut self, fields: &[TlvField]) {
        for field in fields {
            self.value(field.tag, &field.value);
        }
    }

    /// Take the encoded bytes; fails if a container is still open.
    pub fn finish(self) -> Result<Vec<u8>, TlvError> {
        if self.open_containers != 0 {
            return Err(TlvError::UnterminatedContainer);
        }
        Ok(self.buf)
    }
}
