//! Attribute and command paths.
//!
//! Paths are TLV lists; a missing endpoint, cluster, or attribute field is a
//! wildcard that expands against the device catalog at dispatch time.

use crate::core::ImError;
use crate::tlv::{TlvField, TlvValue};

const ATTR_TAG_ENDPOINT: u8 = 2;
const ATTR_TAG_CLUSTER: u8 = 3;
const ATTR_TAG_ATTRIBUTE: u8 = 4;

const CMD_TAG_ENDPOINT: u8 = 0;
const CMD_TAG_CLUSTER: u8 = 1;
const CMD_TAG_COMMAND: u8 = 2;

/// Attribute path; `None` fields are wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributePath {
    /// Endpoint, or any.
    pub endpoint: Option<u16>,
    /// Cluster, or any.
    pub cluster: Option<u32>,
    /// Attribute, or any.
    pub attribute: Option<u32>,
}

/// Fully resolved attribute location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcretePath {
    /// Endpoint.
    pub endpoint: u16,
    /// Cluster.
    pub cluster: u32,
    /// Attribute.
    pub attribute: u32,
}

impl AttributePath {
    /// Path naming one concrete attribute.
    pub fn concrete(endpoint: u16, cluster: u32, attribute: u32) -> Self {
        Self {
            endpoint: Some(endpoint),
            cluster: Some(cluster),
            attribute: Some(attribute),
        }
    }

    /// Whether every field is present.
    pub fn is_concrete(&self) -> bool {
        self.endpoint.is_some() && self.cluster.is_some() && self.attribute.is_some()
    }

    /// Whether `concrete` falls under this (possibly wildcarded) path.
    pub fn covers(&self, concrete: &ConcretePath) -> bool {
        self.endpoint.is_none_or(|e| e == concrete.endpoint)
            && self.cluster.is_none_or(|c| c == concrete.cluster)
            && self.attribute.is_none_or(|a| a == concrete.attribute)
    }

    /// Encode as a TLV list value.
    pub fn to_tlv(&self) -> TlvValue {
        let mut fields = Vec::new();
        if let Some(endpoint) = self.endpoint {
            fields.push(TlvField::new(ATTR_TAG_ENDPOINT, TlvValue::Unsigned(endpoint as u64)));
        }
        if let Some(cluster) = self.cluster {
            fields.push(TlvField::new(ATTR_TAG_CLUSTER, TlvValue::Unsigned(cluster as u64)));
        }
        if let Some(attribute) = self.attribute {
            fields.push(TlvField::new(ATTR_TAG_ATTRIBUTE, TlvValue::Unsigned(attribute as u64)));
        }
        TlvValue::List(fields)
    }

    /// Decode from a TLV list value.
    pub fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        if value.fields().is_none() {
            return Err(ImError::DecodeFailed);
        }
        let endpoint = match value.field(ATTR_TAG_ENDPOINT) {
            Some(v) => {
                Some(v.as_u64().and_then(|v| u16::try_from(v).ok()).ok_or(ImError::DecodeFailed)?)
            }
            None => None,
        };
        let cluster = match value.field(ATTR_TAG_CLUSTER) {
            Some(v) => {
                Some(v.as_u64().and_then(|v| u32::try_from(v).ok()).ok_or(ImError::DecodeFailed)?)
            }
            None => None,
        };
        let attribute = match value.field(ATTR_TAG_ATTRIBUTE) {
            Some(v) => {
                Some(v.as_u64().and_then(|v| u32::try_from(v).ok()).ok_or(ImError::DecodeFailed)?)
            }
            None => None,
        };
        Ok(Self { endpoint, cluster, attribute })
    }
}

impl From<ConcretePath> for AttributePath {
    fn from(path: ConcretePath) -> Self {
        Self::concrete(path.endpoint, path.cluster, path.attribute)
    }
}

/// Command path; commands are always addressed concretely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandPath {
    /// Endpoint.
    pub endpoint: u16,
    /// Cluster.
    pub cluster: u32,
    /// Command.
    pub command: u32,
}

impl CommandPath {
    /// Encode as a TLV list value.
    pub fn to_tlv(&self) -> TlvValue {
        TlvValue::List(vec![
            TlvField::new(CMD_TAG_ENDPOINT, TlvValue::Unsigned(self.endpoint as u64)),
            TlvField::new(CMD_TAG_CLUSTER, TlvValue::Unsigned(self.cluster as u64)),
            TlvField::new(CMD_TAG_COMMAND, TlvValue::Unsigned(self.command as u64)),
        ])
    }

    /// Decode from a TLV list value.
    pub fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        let endpoint = value
            .field(CMD_TAG_ENDPOINT)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(ImError::DecodeFailed)?;
        let cluster = value
            .field(CMD_TAG_CLUSTER)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(ImError::DecodeFailed)?;
        let command = value
            .field(CMD_TAG_COMMAND)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(ImError::DecodeFailed)?;
        Ok(Self { endpoint, cluster, command })
    }
}
