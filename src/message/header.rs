//! Message and protocol header wire codecs.
//!
//! Both headers are little-endian with optional fields gated by flag bits.
//!
//! Message header (8–24 bytes):
//! ```text
//! +---------+------------+-----------+----------+-----------+-------------+
//! | Flags   | Session ID | Sec Flags | Counter  | Source    | Destination |
//! | 1 byte  | 2 bytes    | 1 byte    | 4 bytes  | 0/8 bytes | 0/2/8 bytes |
//! +---------+------------+-----------+----------+-----------+-------------+
//! ```
//!
//! Protocol header (6+ bytes):
//! ```text
//! +---------+--------+-------------+-------------+-----------+-------------+
//! | X-Flags | Opcode | Exchange ID | Protocol ID | Vendor ID | Ack Counter |
//! | 1 byte  | 1 byte | 2 bytes     | 2 bytes     | 0/2 bytes | 0/4 bytes   |
//! +---------+--------+-------------+-------------+-----------+-------------+
//! ```

use crate::core::FrameError;

/// Message version this stack speaks (header flags, high nibble).
pub const MESSAGE_VERSION: u8 = 0;

const FLAG_SOURCE_PRESENT: u8 = 0x04;
const DSIZ_MASK: u8 = 0x03;
const DSIZ_NONE: u8 = 0x00;
const DSIZ_NODE: u8 = 0x01;
const DSIZ_GROUP: u8 = 0x02;

/// Security-flags bit: privacy-obfuscated header fields.
pub const SECURITY_FLAG_PRIVACY: u8 = 0x80;
/// Security-flags bit: control message.
pub const SECURITY_FLAG_CONTROL: u8 = 0x40;
/// Security-flags bit: message extensions present.
pub const SECURITY_FLAG_EXTENSIONS: u8 = 0x20;
/// Security-flags mask: session type (00 unicast, 01 group).
pub const SECURITY_FLAG_SESSION_TYPE_MASK: u8 = 0x03;

/// Message destination variants selected by the DSIZ field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// No destination field.
    #[default]
    None,
    /// 64-bit destination node id.
    Node(u64),
    /// 16-bit destination group id.
    Group(u16),
}

/// Unencrypted message header; doubles as AAD for encrypted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Session the frame belongs to; 0 selects the plaintext path.
    pub session_id: u16,
    /// Security flags byte (privacy / control / extensions / session type).
    pub security_flags: u8,
    /// Per-session message counter.
    pub counter: u32,
    /// Source node id, when present.
    pub source: Option<u64>,
    /// Destination node or group, when present.
    pub destination: Destination,
}

impl MessageHeader {
    /// Plaintext-path header (session id 0).
    pub fn plaintext(counter: u32) -> Self {
        Self { counter, ..Self::default() }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut len = 8;
        if self.source.is_some() {
            len += 8;
        }
        len += match self.destination {
            Destination::None => 0,
            Destination::Node(_) => 8,
            Destination::Group(_) => 2,
        };
        len
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        let mut flags = MESSAGE_VERSION << 4;
        if self.source.is_some() {
            flags |= FLAG_SOURCE_PRESENT;
        }
        flags |= match self.destination {
            Destination::None => DSIZ_NONE,
            Destination::Node(_) => DSIZ_NODE,
            Destination::Group(_) => DSIZ_GROUP,
        };
        buf.push(flags);
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.push(self.security_flags);
        buf.extend_from_slice(&self.counter.to_le_bytes());
        if let Some(source) = self.source {
            buf.extend_from_slice(&source.to_le_bytes());
        }
        match self.destination {
            Destination::None => {}
            Destination::Node(node) => buf.extend_from_slice(&node.to_le_bytes()),
            Destination::Group(group) => buf.extend_from_slice(&group.to_le_bytes()),
        }
        buf
    }

    /// Parse from wire bytes; returns the header and the remainder.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), FrameError> {
        if bytes.len() < 8 {
            return Err(FrameError::TruncatedHeader);
        }
        let flags = bytes[0];
        let version = flags >> 4;
        if version != MESSAGE_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let session_id = u16::from_le_bytes([bytes[1], bytes[2]]);
        let security_flags = bytes[3];
        let counter = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        let mut pos = 8;
        let source = if flags & FLAG_SOURCE_PRESENT != 0 {
            let raw = bytes.get(pos..pos + 8).ok_or(FrameError::TruncatedHeader)?;
            pos += 8;
            Some(u64::from_le_bytes(raw.try_into().unwrap()))
        } else {
            None
        };
        let destination = match flags & DSIZ_MASK {
            DSIZ_NONE => Destination::None,
            DSIZ_NODE => {
                let raw = bytes.get(pos..pos + 8).ok_or(FrameError::TruncatedHeader)?;
                pos += 8;
                Destination::Node(u64::from_le_bytes(raw.try_into().unwrap()))
            }
            DSIZ_GROUP => {
                let raw = bytes.get(pos..pos + 2).ok_or(FrameError::TruncatedHeader)?;
                pos += 2;
                Destination::Group(u16::from_le_bytes(raw.try_into().unwrap()))
            }
            _ => return Err(FrameError::TruncatedHeader),
        };

        Ok((
            Self { session_id, security_flags, counter, source, destination },
            &bytes[pos..],
        ))
    }
}

const XFLAG_INITIATOR: u8 = 0x01;
const XFLAG_ACK: u8 = 0x02;
const XFLAG_RELIABLE: u8 = 0x04;
const XFLAG_VENDOR: u8 = 0x10;
const XFLAG_SECURED_EXTENSIONS: u8 = 0x20;

/// Protocol header: exchange correlation and opcode dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolHeader {
    /// Set on messages sent by the exchange initiator.
    pub initiator: bool,
    /// Sender requests a (piggyback or standalone) acknowledgement.
    pub reliable: bool,
    /// Secured-extensions flag; carried, never interpreted.
    pub secured_extensions: bool,
    /// Protocol-scoped opcode.
    pub opcode: u8,
    /// Exchange id correlating request and response.
    pub exchange_id: u16,
    /// Protocol id selecting the opcode namespace.
    pub protocol_id: u16,
    /// Vendor id, when the protocol id is vendor-scoped.
    pub vendor_id: Option<u16>,
    /// Counter of the message this one acknowledges.
    pub ack_counter: Option<u32>,
}

impl ProtocolHeader {
    /// Serialize the header followed by `payload`.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(14 + payload.len());
        let mut flags = 0u8;
        if self.initiator {
            flags |= XFLAG_INITIATOR;
        }
        if self.ack_counter.is_some() {
            flags |= XFLAG_ACK;
        }
        if self.reliable {
            flags |= XFLAG_RELIABLE;
        }
        if self.vendor_id.is_some() {
            flags |= XFLAG_VENDOR;
        }
        if self.secured_extensions {
            flags |= XFLAG_SECURED_EXTENSIONS;
        }
        buf.push(flags);
        buf.push(self.opcode);
        buf.extend_from_slice(&self.exchange_id.to_le_bytes());
        buf.extend_from_slice(&self.protocol_id.to_le_bytes());
        if let Some(vendor) = self.vendor_id {
            buf.extend_from_slice(&vendor.to_le_bytes());
        }
        if let Some(ack) = self.ack_counter {
            buf.extend_from_slice(&ack.to_le_bytes());
        }
        buf.extend_from_slice(payload);
        buf
    }

    /// Parse from bytes; returns the header and the payload remainder.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), FrameError> {
        if bytes.len() < 6 {
            return Err(FrameError::TruncatedProtoHeader);
        }
        let flags = bytes[0];
        let opcode = bytes[1];
        let exchange_id = u16::from_le_bytes([bytes[2], bytes[3]]);
        let protocol_id = u16::from_le_bytes([bytes[4], bytes[5]]);

        let mut pos = 6;
        let vendor_id = if flags & XFLAG_VENDOR != 0 {
            let raw = bytes.get(pos..pos + 2).ok_or(FrameError::TruncatedProtoHeader)?;
            pos += 2;
            Some(u16::from_le_bytes(raw.try_into().unwrap()))
        } else {
            None
        };
        let ack_counter = if flags & XFLAG_ACK != 0 {
            let raw = bytes.get(pos..pos + 4).ok_or(FrameError::TruncatedProtoHeader)?;
            pos += 4;
            Some(u32::from_le_bytes(raw.try_into().unwrap()))
        } else {
            None
        };

        Ok((
            Self {
                initiator: flags & XFLAG_INITIATOR != 0,
                reliable: flags & XFLAG_RELIABLE != 0,
                secured_extensions: flags & XFLAG_SECURED_EXTENSIONS != 0,
                opcode,
                exchange_id,
                protocol_id,
                vendor_id,
                ack_counter,
            },
            &bytes[pos..],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_headers_encode_to_fourteen_bytes() {
        let header = MessageHeader { session_id: 0, counter: 1, ..Default::default() };
        let proto = ProtocolHeader {
            opcode: 0x20,
            exchange_id: 1,
            protocol_id: 0,
            ..Default::default()
        };
        let frame = [header.encode(), proto.encode(&[])].concat();
        assert_eq!(frame.len(), 14);

        let (h2, rest) = MessageHeader::decode(&frame).unwrap();
        let (p2, payload) = ProtocolHeader::decode(rest).unwrap();
        assert_eq!(h2, header);
        assert_eq!(p2, proto);
        assert!(payload.is_empty());
    }

    #[test]
    fn header_roundtrip_with_source_and_node_destination() {
        let header = MessageHeader {
            session_id: 0xBEEF,
            security_flags: 0x01,
            counter: 0xDEADBEEF,
            source: Some(0x1122334455667788),
            destination: Destination::Node(0x8877665544332211),
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), 24);
        let (decoded, rest) = MessageHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn header_roundtrip_with_group_destination() {
        let header = MessageHeader {
            session_id: 7,
            counter: 3,
            destination: Destination::Group(0xABCD),
            ..Default::default()
        };
        let (decoded, _) = MessageHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn proto_roundtrip_with_ack_and_vendor() {
        let proto = ProtocolHeader {
            initiator: true,
            reliable: true,
            opcode: 0x05,
            exchange_id: 0x0102,
            protocol_id: 0x0001,
            vendor_id: Some(0xFFF1),
            ack_counter: Some(0xCAFEBABE),
            ..Default::default()
        };
        let bytes = proto.encode(&[0xAA, 0xBB]);
        let (decoded, payload) = ProtocolHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, proto);
        assert_eq!(payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn truncated_inputs_are_rejected() {
        assert_eq!(
            MessageHeader::decode(&[0u8; 4]).unwrap_err(),
            FrameError::TruncatedHeader
        );
        assert_eq!(
            ProtocolHeader::decode(&[0u8; 3]).unwrap_err(),
            FrameError::TruncatedProtoHeader
        );
        // Source bit set but no source bytes present.
        let short = [0x04, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            MessageHeader::decode(&short).unwrap_err(),
            FrameError::TruncatedHeader
        );
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut bytes = MessageHeader::plaintext(1).encode();
        bytes[0] |= 0x10;
        assert_eq!(
            MessageHeader::decode(&bytes).unwrap_err(),
            FrameError::UnsupportedVersion(1)
        );
    }
}
