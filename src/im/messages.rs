//! Interaction Model message structs and their TLV codecs.
//!
//! Every IM payload is a context-tagged top-level struct. Encoders build a
//! [`TlvValue`] tree and serialize it; decoders walk the tree with the typed
//! accessors and fail with `DecodeFailed` on shape mismatches.

use crate::core::ImError;
use crate::tlv::{decode, TlvField, TlvValue};

use super::path::{AttributePath, CommandPath, ConcretePath};
use super::status::StatusCode;

/// StatusResponse: terminal status for a whole interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponseMsg {
    /// IM status of the interaction.
    pub status: StatusCode,
}

impl StatusResponseMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![TlvField::new(0, TlvValue::Unsigned(self.status.as_u8() as u64))])
            .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let status = value.field(0).and_then(TlvValue::as_u64).ok_or(ImError::DecodeFailed)?;
        Ok(Self { status: StatusCode::from_u8(status as u8) })
    }
}

/// TimedRequest: arms a timed interaction on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedRequestMsg {
    /// Interaction deadline, milliseconds from receipt.
    pub timeout_ms: u32,
}

impl TimedRequestMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![TlvField::new(0, TlvValue::Unsigned(self.timeout_ms as u64))])
            .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let timeout = value.field(0).and_then(TlvValue::as_u64).ok_or(ImError::DecodeFailed)?;
        Ok(Self { timeout_ms: timeout as u32 })
    }
}

/// ReadRequest: one or more attribute paths, possibly wildcarded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRequestMsg {
    /// Paths to read.
    pub attribute_requests: Vec<AttributePath>,
    /// Restrict fabric-scoped data to the accessing fabric.
    pub fabric_filtered: bool,
}

impl ReadRequestMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![
            TlvField::new(
                0,
                TlvValue::Array(self.attribute_requests.iter().map(AttributePath::to_tlv).collect()),
            ),
            TlvField::new(3, TlvValue::Bool(self.fabric_filtered)),
        ])
        .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let paths = match value.field(0) {
            Some(array) => array
                .items()
                .ok_or(ImError::DecodeFailed)?
                .iter()
                .map(AttributePath::from_tlv)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let fabric_filtered =
            value.field(3).and_then(TlvValue::as_bool).unwrap_or(false);
        Ok(Self { attribute_requests: paths, fabric_filtered })
    }
}

/// One attribute value in a report or write.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    /// Cluster data version at read time (zero in writes).
    pub data_version: u32,
    /// Concrete location.
    pub path: ConcretePath,
    /// The value.
    pub value: TlvValue,
}

impl AttributeData {
    fn to_tlv(&self) -> TlvValue {
        TlvValue::Struct(vec![
            TlvField::new(0, TlvValue::Unsigned(self.data_version as u64)),
            TlvField::new(1, AttributePath::from(self.path).to_tlv()),
            TlvField::new(2, self.value.clone()),
        ])
    }

    fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        let data_version =
            value.field(0).and_then(TlvValue::as_u64).unwrap_or(0) as u32;
        let path = AttributePath::from_tlv(value.field(1).ok_or(ImError::DecodeFailed)?)?;
        let concrete = ConcretePath {
            endpoint: path.endpoint.ok_or(ImError::DecodeFailed)?,
            cluster: path.cluster.ok_or(ImError::DecodeFailed)?,
            attribute: path.attribute.ok_or(ImError::DecodeFailed)?,
        };
        let data = value.field(2).ok_or(ImError::DecodeFailed)?.clone();
        Ok(Self { data_version, path: concrete, value: data })
    }
}

/// A status bound to an attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeStatus {
    /// Path the status applies to (echoed as requested, wildcards kept).
    pub path: AttributePath,
    /// IM status.
    pub status: StatusCode,
}

impl AttributeStatus {
    fn to_tlv(&self) -> TlvValue {
        TlvValue::Struct(vec![
            TlvField::new(0, self.path.to_tlv()),
            TlvField::new(
                1,
                TlvValue::Struct(vec![TlvField::new(
                    0,
                    TlvValue::Unsigned(self.status.as_u8() as u64),
                )]),
            ),
        ])
    }

    fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        let path = AttributePath::from_tlv(value.field(0).ok_or(ImError::DecodeFailed)?)?;
        let status = value
            .field(1)
            .and_then(|s| s.field(0))
            .and_then(TlvValue::as_u64)
            .ok_or(ImError::DecodeFailed)?;
        Ok(Self { path, status: StatusCode::from_u8(status as u8) })
    }
}

/// Attribute report: data or status, one per resolved path.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeReport {
    /// Successful read.
    Data(AttributeData),
    /// Error for the path.
    Status(AttributeStatus),
}

impl AttributeReport {
    fn to_tlv(&self) -> TlvValue {
        match self {
            AttributeReport::Status(status) => {
                TlvValue::Struct(vec![TlvField::new(0, status.to_tlv())])
            }
            AttributeReport::Data(data) => {
                TlvValue::Struct(vec![TlvField::new(1, data.to_tlv())])
            }
        }
    }

    fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        if let Some(status) = value.field(0) {
            return Ok(AttributeReport::Status(AttributeStatus::from_tlv(status)?));
        }
        if let Some(data) = value.field(1) {
            return Ok(AttributeReport::Data(AttributeData::from_tlv(data)?));
        }
        Err(ImError::DecodeFailed)
    }
}

/// ReportData: the response to reads and the body of subscription reports.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportDataMsg {
    /// Present on subscription reports.
    pub subscription_id: Option<u32>,
    /// One entry per resolved path.
    pub reports: Vec<AttributeReport>,
    /// Client must not answer with a StatusResponse.
    pub suppress_response: bool,
    /// More chunks of this report follow.
    pub more_chunks: bool,
}

impl ReportDataMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = Vec::new();
        if let Some(id) = self.subscription_id {
            fields.push(TlvField::new(0, TlvValue::Unsigned(id as u64)));
        }
        fields.push(TlvField::new(
            1,
            TlvValue::Array(self.reports.iter().map(AttributeReport::to_tlv).collect()),
        ));
        if self.suppress_response {
            fields.push(TlvField::new(4, TlvValue::Bool(true)));
        }
        if self.more_chunks {
            fields.push(TlvField::new(5, TlvValue::Bool(true)));
        }
        TlvValue::Struct(fields).encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let subscription_id =
            value.field(0).and_then(TlvValue::as_u64).map(|v| v as u32);
        let reports = match value.field(1) {
            Some(array) => array
                .items()
                .ok_or(ImError::DecodeFailed)?
                .iter()
                .map(AttributeReport::from_tlv)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            subscription_id,
            reports,
            suppress_response: value.field(4).and_then(TlvValue::as_bool).unwrap_or(false),
            more_chunks: value.field(5).and_then(TlvValue::as_bool).unwrap_or(false),
        })
    }
}

/// One attribute write.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeWrite {
    /// Target path (must be concrete for dispatch).
    pub path: AttributePath,
    /// Value to write.
    pub value: TlvValue,
}

/// WriteRequest: a batch of attribute writes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteRequestMsg {
    /// Arrived under a timed interaction.
    pub timed: bool,
    /// Writes in request order.
    pub writes: Vec<AttributeWrite>,
}

impl WriteRequestMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        let writes = self
            .writes
            .iter()
            .map(|write| {
                TlvValue::Struct(vec![
                    TlvField::new(1, write.path.to_tlv()),
                    TlvField::new(2, write.value.clone()),
                ])
            })
            .collect();
        TlvValue::Struct(vec![
            TlvField::new(1, TlvValue::Bool(self.timed)),
            TlvField::new(2, TlvValue::Array(writes)),
        ])
        .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let timed = value.field(1).and_then(TlvValue::as_bool).unwrap_or(false);
        let writes = match value.field(2) {
            Some(array) => array
                .items()
                .ok_or(ImError::DecodeFailed)?
                .iter()
                .map(|entry| {
                    let path =
                        AttributePath::from_tlv(entry.field(1).ok_or(ImError::DecodeFailed)?)?;
                    let data = entry.field(2).ok_or(ImError::DecodeFailed)?.clone();
                    Ok(AttributeWrite { path, value: data })
                })
                .collect::<Result<Vec<_>, ImError>>()?,
            None => Vec::new(),
        };
        Ok(Self { timed, writes })
    }
}

/// WriteResponse: one status per write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteResponseMsg {
    /// Statuses in request order.
    pub statuses: Vec<AttributeStatus>,
}

impl WriteResponseMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![TlvField::new(
            0,
            TlvValue::Array(self.statuses.iter().map(AttributeStatus::to_tlv).collect()),
        )])
        .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let statuses = match value.field(0) {
            Some(array) => array
                .items()
                .ok_or(ImError::DecodeFailed)?
                .iter()
                .map(AttributeStatus::from_tlv)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self { statuses })
    }
}

/// One command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandData {
    /// Target command.
    pub path: CommandPath,
    /// Command fields, if the command takes any.
    pub fields: Option<TlvValue>,
}

impl CommandData {
    fn to_tlv(&self) -> TlvValue {
        let mut fields = vec![TlvField::new(0, self.path.to_tlv())];
        if let Some(data) = &self.fields {
            fields.push(TlvField::new(1, data.clone()));
        }
        TlvValue::Struct(fields)
    }

    fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        let path = CommandPath::from_tlv(value.field(0).ok_or(ImError::DecodeFailed)?)?;
        Ok(Self { path, fields: value.field(1).cloned() })
    }
}

/// A status bound to a command path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    /// Command the status applies to.
    pub path: CommandPath,
    /// IM status.
    pub status: StatusCode,
}

impl CommandStatus {
    fn to_tlv(&self) -> TlvValue {
        TlvValue::Struct(vec![
            TlvField::new(0, self.path.to_tlv()),
            TlvField::new(
                1,
                TlvValue::Struct(vec![TlvField::new(
                    0,
                    TlvValue::Unsigned(self.status.as_u8() as u64),
                )]),
            ),
        ])
    }

    fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        let path = CommandPath::from_tlv(value.field(0).ok_or(ImError::DecodeFailed)?)?;
        let status = value
            .field(1)
            .and_then(|s| s.field(0))
            .and_then(TlvValue::as_u64)
            .ok_or(ImError::DecodeFailed)?;
        Ok(Self { path, status: StatusCode::from_u8(status as u8) })
    }
}

/// InvokeRequest: a batch of command invocations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvokeRequestMsg {
    /// Fire-and-forget: no InvokeResponse wanted.
    pub suppress_response: bool,
    /// Arrived under a timed interaction.
    pub timed: bool,
    /// Invocations in request order.
    pub invokes: Vec<CommandData>,
}

impl InvokeRequestMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![
            TlvField::new(0, TlvValue::Bool(self.suppress_response)),
            TlvField::new(1, TlvValue::Bool(self.timed)),
            TlvField::new(2, TlvValue::Array(self.invokes.iter().map(CommandData::to_tlv).collect())),
        ])
        .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let invokes = match value.field(2) {
            Some(array) => array
                .items()
                .ok_or(ImError::DecodeFailed)?
                .iter()
                .map(CommandData::from_tlv)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            suppress_response: value.field(0).and_then(TlvValue::as_bool).unwrap_or(false),
            timed: value.field(1).and_then(TlvValue::as_bool).unwrap_or(false),
            invokes,
        })
    }
}

/// One entry of an InvokeResponse.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeResponseEntry {
    /// Command produced response data.
    Command(CommandData),
    /// Command produced a bare status.
    Status(CommandStatus),
}

impl InvokeResponseEntry {
    fn to_tlv(&self) -> TlvValue {
        match self {
            InvokeResponseEntry::Command(data) => {
                TlvValue::Struct(vec![TlvField::new(0, data.to_tlv())])
            }
            InvokeResponseEntry::Status(status) => {
                TlvValue::Struct(vec![TlvField::new(1, status.to_tlv())])
            }
        }
    }

    fn from_tlv(value: &TlvValue) -> Result<Self, ImError> {
        if let Some(data) = value.field(0) {
            return Ok(InvokeResponseEntry::Command(CommandData::from_tlv(data)?));
        }
        if let Some(status) = value.field(1) {
            return Ok(InvokeResponseEntry::Status(CommandStatus::from_tlv(status)?));
        }
        Err(ImError::DecodeFailed)
    }
}

/// InvokeResponse: one entry per invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvokeResponseMsg {
    /// Mirrors the request's suppress flag.
    pub suppress_response: bool,
    /// Entries in request order.
    pub responses: Vec<InvokeResponseEntry>,
}

impl InvokeResponseMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![
            TlvField::new(0, TlvValue::Bool(self.suppress_response)),
            TlvField::new(
                1,
                TlvValue::Array(self.responses.iter().map(InvokeResponseEntry::to_tlv).collect()),
            ),
        ])
        .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let responses = match value.field(1) {
            Some(array) => array
                .items()
                .ok_or(ImError::DecodeFailed)?
                .iter()
                .map(InvokeResponseEntry::from_tlv)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            suppress_response: value.field(0).and_then(TlvValue::as_bool).unwrap_or(false),
            responses,
        })
    }
}

/// SubscribeRequest: paths plus report interval bounds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscribeRequestMsg {
    /// Keep other subscriptions on this session alive.
    pub keep_subscriptions: bool,
    /// Minimum seconds between reports.
    pub min_interval: u16,
    /// Maximum seconds without a report.
    pub max_interval: u16,
    /// Paths to watch.
    pub attribute_requests: Vec<AttributePath>,
}

impl SubscribeRequestMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![
            TlvField::new(0, TlvValue::Bool(self.keep_subscriptions)),
            TlvField::new(1, TlvValue::Unsigned(self.min_interval as u64)),
            TlvField::new(2, TlvValue::Unsigned(self.max_interval as u64)),
            TlvField::new(
                3,
                TlvValue::Array(self.attribute_requests.iter().map(AttributePath::to_tlv).collect()),
            ),
        ])
        .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let min_interval = value
            .field(1)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(ImError::DecodeFailed)?;
        let max_interval = value
            .field(2)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(ImError::DecodeFailed)?;
        let paths = match value.field(3) {
            Some(array) => array
                .items()
                .ok_or(ImError::DecodeFailed)?
                .iter()
                .map(AttributePath::from_tlv)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            keep_subscriptions: value.field(0).and_then(TlvValue::as_bool).unwrap_or(false),
            min_interval,
            max_interval,
            attribute_requests: paths,
        })
    }
}

/// SubscribeResponse: the granted subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeResponseMsg {
    /// Server-assigned subscription id.
    pub subscription_id: u32,
    /// Granted maximum report interval, seconds.
    pub max_interval: u16,
}

impl SubscribeResponseMsg {
    /// Encode to TLV bytes.
    pub fn encode(&self) -> Vec<u8> {
        TlvValue::Struct(vec![
            TlvField::new(0, TlvValue::Unsigned(self.subscription_id as u64)),
            TlvField::new(2, TlvValue::Unsigned(self.max_interval as u64)),
        ])
        .encode()
    }

    /// Decode from TLV bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImError> {
        let value = decode(bytes)?;
        let subscription_id =
            value.field(0).and_then(TlvValue::as_u64).ok_or(ImError::DecodeFailed)? as u32;
        let max_interval = value
            .field(2)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(ImError::DecodeFailed)?;
        Ok(Self { subscription_id, max_interval })
    }
}
