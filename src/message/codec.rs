//! Frame assembly: plaintext and AEAD-protected message codecs.

use crate::core::{CryptoError, FrameError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE};
use crate::crypto::{aes128_ccm_decrypt, aes128_ccm_encrypt};

use super::header::{MessageHeader, ProtocolHeader};

/// AEAD nonce: security flags ∥ message counter (LE32) ∥ source node (LE64).
///
/// `source` is the header's source node id when present, otherwise the
/// session's notion of the sending node (zero on PASE sessions).
pub fn nonce(security_flags: u8, counter: u32, source: u64) -> [u8; AEAD_NONCE_SIZE] {
    let mut n = [0u8; AEAD_NONCE_SIZE];
    n[0] = security_flags;
    n[1..5].copy_from_slice(&counter.to_le_bytes());
    n[5..13].copy_from_slice(&source.to_le_bytes());
    n
}

/// Encode an unprotected frame: message header ∥ protocol header ∥ payload.
pub fn encode_plaintext(
    header: &MessageHeader,
    proto: &ProtocolHeader,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = header.encode();
    frame.extend_from_slice(&proto.encode(payload));
    frame
}

/// Decode an unprotected frame into its three parts.
pub fn decode_plaintext(
    bytes: &[u8],
) -> Result<(MessageHeader, ProtocolHeader, Vec<u8>), FrameError> {
    let (header, rest) = MessageHeader::decode(bytes)?;
    let (proto, payload) = ProtocolHeader::decode(rest)?;
    Ok((header, proto, payload.to_vec()))
}

/// Seal `proto_bytes` under `key`: header ∥ AES-128-CCM ciphertext ∥ MIC.
///
/// The encoded message header is the AAD; see [`nonce`] for nonce layout.
pub fn seal(
    header: &MessageHeader,
    key: &[u8; 16],
    nonce_source: u64,
    proto_bytes: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut frame = header.encode();
    let n = nonce(header.security_flags, header.counter, nonce_source);
    let (ciphertext, tag) = aes128_ccm_encrypt(proto_bytes, key, &n, &frame)?;
    frame.extend_from_slice(&ciphertext);
    frame.extend_from_slice(&tag);
    Ok(frame)
}

/// Error opening a protected frame: short input or failed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// Header parsing failed or fewer than 16 bytes followed it.
    Frame(FrameError),
    /// MIC did not verify.
    Crypto(CryptoError),
}

/// Open a protected frame, returning its header and decrypted payload.
///
/// `fallback_source` supplies the nonce's node id when the header carries no
/// source field (zero for PASE-keyed sessions).
pub fn open(
    bytes: &[u8],
    key: &[u8; 16],
    fallback_source: u64,
) -> Result<(MessageHeader, Vec<u8>), OpenError> {
    let (header, rest) = MessageHeader::decode(bytes).map_err(OpenError::Frame)?;
    if rest.len() < AEAD_TAG_SIZE {
        return Err(OpenError::Frame(FrameError::TruncatedMic));
    }
    let aad = &bytes[..bytes.len() - rest.len()];
    let (ciphertext, tag) = rest.split_at(rest.len() - AEAD_TAG_SIZE);
    let source = header.source.unwrap_or(fallback_source);
    let n = nonce(header.security_flags, header.counter, source);
    let plaintext = aes128_ccm_decrypt(ciphertext, tag, key, &n, aad)
        .map_err(|_| OpenError::Crypto(CryptoError::AuthenticationFailed))?;
    Ok((header, plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x42; 16];

    fn sample_header(counter: u32) -> MessageHeader {
        MessageHeader { session_id: 0x0101, counter, ..Default::default() }
    }

    #[test]
    fn plaintext_roundtrip() {
        let header = MessageHeader::plaintext(9);
        let proto = ProtocolHeader {
            opcode: 0x21,
            exchange_id: 4,
            protocol_id: 0,
            ..Default::default()
        };
        let frame = encode_plaintext(&header, &proto, b"pbkdf");
        let (h, p, payload) = decode_plaintext(&frame).unwrap();
        assert_eq!(h, header);
        assert_eq!(p, proto);
        assert_eq!(payload, b"pbkdf");
    }

    #[test]
    fn seal_then_open_roundtrip() {
        let header = sample_header(77);
        let proto = ProtocolHeader { opcode: 0x05, exchange_id: 2, protocol_id: 1, ..Default::default() };
        let proto_bytes = proto.encode(b"report body");

        let frame = seal(&header, &KEY, 0, &proto_bytes).unwrap();
        let (h, plaintext) = open(&frame, &KEY, 0).unwrap();
        assert_eq!(h, header);
        assert_eq!(plaintext, proto_bytes);
    }

    #[test]
    fn any_single_byte_flip_fails_authentication() {
        let header = sample_header(5);
        let frame = seal(&header, &KEY, 0, b"test payload").unwrap();
        for i in 0..frame.len() {
            let mut tampered = frame.clone();
            tampered[i] ^= 0x01;
            // A flip in the version nibble fails parsing; everywhere else
            // must fail the MIC.
            match open(&tampered, &KEY, 0) {
                Err(_) => {}
                Ok(_) => panic!("tampered byte {i} accepted"),
            }
        }
    }

    #[test]
    fn short_ciphertext_reports_truncated_mic() {
        let header = sample_header(5);
        let mut frame = header.encode();
        frame.extend_from_slice(&[0u8; AEAD_TAG_SIZE - 1]);
        assert_eq!(
            open(&frame, &KEY, 0).unwrap_err(),
            OpenError::Frame(FrameError::TruncatedMic)
        );
    }

    #[test]
    fn nonce_layout_is_flags_counter_source() {
        let n = nonce(0x80, 0x01020304, 0x1112131415161718);
        assert_eq!(n[0], 0x80);
        assert_eq!(&n[1..5], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&n[5..], &[0x18, 0x17, 0x16, 0x15, 0x14, 0x13, 0x12, 0x11]);
    }

    #[test]
    fn counter_is_bound_into_the_nonce() {
        let header = sample_header(10);
        let frame = seal(&header, &KEY, 0, b"x").unwrap();
        // Same frame presented as a different counter must not open.
        let mut moved = frame.clone();
        moved[4] = moved[4].wrapping_add(1);
        assert!(open(&moved, &KEY, 0).is_err());
    }
}
