//! Node Operational Certificate decoding.
//!
//! CASE needs three things out of a NOC: the subject node id, the subject
//! fabric id, and the P-256 public key. Production commissioners (chip-tool)
//! send X.509 DER with the Matter-specific DN attributes; the compact TLV
//! form carries the same three fields directly and is what test fixtures
//! and locally provisioned fabrics use. The leading byte disambiguates:
//! 0x30 is a DER SEQUENCE, 0x15 an anonymous TLV struct.

use x509_parser::prelude::*;

use crate::core::{HandshakeError, P256_PUBLIC_KEY_SIZE};
use crate::tlv::{decode, TlvValue, TlvWriter};

/// Matter DN attribute: node id (16 hex digits).
const OID_MATTER_NODE_ID: &str = "1.3.6.1.4.1.37244.1.1";
/// Matter DN attribute: fabric id (16 hex digits).
const OID_MATTER_FABRIC_ID: &str = "1.3.6.1.4.1.37244.1.5";

const TLV_TAG_NODE_ID: u8 = 1;
const TLV_TAG_FABRIC_ID: u8 = 2;
const TLV_TAG_PUBLIC_KEY: u8 = 3;

/// The identity a NOC binds to a public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NocInfo {
    /// Operational node id.
    pub node_id: u64,
    /// Fabric id.
    pub fabric_id: u64,
    /// Uncompressed SEC1 P-256 public key.
    pub public_key: [u8; P256_PUBLIC_KEY_SIZE],
}

/// Decode a NOC in either supported form.
pub fn decode_noc(bytes: &[u8]) -> Result<NocInfo, HandshakeError> {
    match bytes.first() {
        Some(0x15) => decode_tlv_noc(bytes),
        Some(0x30) => decode_der_noc(bytes),
        _ => Err(HandshakeError::InvalidMessage),
    }
}

/// Encode the compact TLV form, used by tests and local provisioning.
pub fn encode_test_noc(node_id: u64, fabric_id: u64, public_key: &[u8; P256_PUBLIC_KEY_SIZE]) -> Vec<u8> {
    let mut w = TlvWriter::new();
    w.start_struct(None);
    w.unsigned(Some(TLV_TAG_NODE_ID), node_id);
    w.unsigned(Some(TLV_TAG_FABRIC_ID), fabric_id);
    w.octets(Some(TLV_TAG_PUBLIC_KEY), public_key);
    let _ = w.end_container();
    w.finish().expect("writer is balanced")
}

fn decode_tlv_noc(bytes: &[u8]) -> Result<NocInfo, HandshakeError> {
    let value = decode(bytes).map_err(|_| HandshakeError::InvalidMessage)?;
    let node_id = value
        .field(TLV_TAG_NODE_ID)
        .and_then(TlvValue::as_u64)
        .ok_or(HandshakeError::InvalidMessage)?;
    let fabric_id = value
        .field(TLV_TAG_FABRIC_ID)
        .and_then(TlvValue::as_u64)
        .ok_or(HandshakeError::InvalidMessage)?;
    let key_bytes = value
        .field(TLV_TAG_PUBLIC_KEY)
        .and_then(TlvValue::as_bytes)
        .ok_or(HandshakeError::InvalidMessage)?;
    let public_key: [u8; P256_PUBLIC_KEY_SIZE] =
        key_bytes.try_into().map_err(|_| HandshakeError::InvalidMessage)?;
    Ok(NocInfo { node_id, fabric_id, public_key })
}

fn decode_der_noc(bytes: &[u8]) -> Result<NocInfo, HandshakeError> {
    let (_, certificate) =
        X509Certificate::from_der(bytes).map_err(|_| HandshakeError::InvalidMessage)?;

    let mut node_id = None;
    let mut fabric_id = None;
    for attribute in certificate.subject().iter_attributes() {
        let oid = attribute.attr_type().to_id_string();
        if oid == OID_MATTER_NODE_ID {
            node_id = Some(parse_hex_id(attribute)?);
        } else if oid == OID_MATTER_FABRIC_ID {
            fabric_id = Some(parse_hex_id(attribute)?);
        }
    }

    let key_data = certificate.public_key().subject_public_key.data.as_ref();
    let public_key: [u8; P256_PUBLIC_KEY_SIZE] =
        key_data.try_into().map_err(|_| HandshakeError::InvalidMessage)?;

    Ok(NocInfo {
        node_id: node_id.ok_or(HandshakeError::InvalidMessage)?,
        fabric_id: fabric_id.ok_or(HandshakeError::InvalidMessage)?,
        public_key,
    })
}

fn parse_hex_id(attribute: &AttributeTypeAndValue<'_>) -> Result<u64, HandshakeError> {
    let text = attribute.as_str().map_err(|_| HandshakeError::InvalidMessage)?;
    u64::from_str_radix(text, 16).map_err(|_| HandshakeError::InvalidMessage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::p256_keypair;

    #[test]
    fn tlv_noc_roundtrip() {
        let (public_key, _) = p256_keypair();
        let encoded = encode_test_noc(0x0000_0000_DEAD_BEEF, 0xFAB1, &public_key);
        let info = decode_noc(&encoded).unwrap();
        assert_eq!(info.node_id, 0x0000_0000_DEAD_BEEF);
        assert_eq!(info.fabric_id, 0xFAB1);
        assert_eq!(info.public_key, public_key);
    }

    #[test]
    fn unknown_leading_byte_is_rejected() {
        assert_eq!(
            decode_noc(&[0x99, 0x00]).unwrap_err(),
            HandshakeError::InvalidMessage
        );
        assert_eq!(decode_noc(&[]).unwrap_err(), HandshakeError::InvalidMessage);
    }

    #[test]
    fn truncated_tlv_noc_is_rejected() {
        let (public_key, _) = p256_keypair();
        let mut encoded = encode_test_noc(1, 1, &public_key);
        encoded.truncate(encoded.len() / 2);
        assert!(decode_noc(&encoded).is_err());
    }

    #[test]
    fn tlv_noc_with_short_key_is_rejected() {
        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.unsigned(Some(1), 5);
        w.unsigned(Some(2), 6);
        w.octets(Some(3), &[0u8; 33]);
        w.end_container().unwrap();
        let encoded = w.finish().unwrap();
        assert_eq!(decode_noc(&encoded).unwrap_err(), HandshakeError::InvalidMessage);
    }
}
