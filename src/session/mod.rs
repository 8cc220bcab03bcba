//! Secure sessions: key schedule, replay defense, frame seal/open.
//!
//! A session is born when a PASE or CASE handshake completes. Both sides
//! derive the same 48 bytes of key material and split it into the
//! initiator-to-responder key, the responder-to-initiator key, and the
//! attestation challenge; which half encrypts and which decrypts depends on
//! the role, so an initiator's pair is the responder's inverse.

mod replay;

pub use replay::ReplayWindow;

use zeroize::Zeroize;

use crate::core::{
    CryptoError, MessageCounter, SessionError, StackError, AEAD_KEY_SIZE,
    ATTESTATION_CHALLENGE_SIZE, SESSION_KEY_MATERIAL_SIZE,
};
use crate::crypto::hkdf_sha256;
use crate::message::{self, MessageHeader};

/// HKDF info label for session-key derivation.
const SESSION_KEYS_INFO: &[u8] = b"SessionKeys";

/// Which side of the handshake this session record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// The side that sent the first handshake message.
    Initiator,
    /// The side that answered it.
    Responder,
}

/// How the peer authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Passcode-authenticated (commissioning).
    Pase,
    /// Certificate-authenticated (operational).
    Case,
    /// Group key identifier lookup.
    Group,
}

/// Directional session keys plus the attestation challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// Initiator-to-responder key.
    pub i2r: [u8; AEAD_KEY_SIZE],
    /// Responder-to-initiator key.
    pub r2i: [u8; AEAD_KEY_SIZE],
    /// Attestation challenge handed to the attestation cluster.
    pub attestation_challenge: [u8; ATTESTATION_CHALLENGE_SIZE],
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.i2r.zeroize();
        self.r2i.zeroize();
    }
}

/// Derive `(I2R, R2I, attestation challenge)` from a handshake secret.
pub fn derive_session_keys(ikm: &[u8]) -> Result<SessionKeys, CryptoError> {
    let mut material = [0u8; SESSION_KEY_MATERIAL_SIZE];
    hkdf_sha256(&[], ikm, SESSION_KEYS_INFO, &mut material)?;
    let mut keys = SessionKeys {
        i2r: [0; AEAD_KEY_SIZE],
        r2i: [0; AEAD_KEY_SIZE],
        attestation_challenge: [0; ATTESTATION_CHALLENGE_SIZE],
    };
    keys.i2r.copy_from_slice(&material[..16]);
    keys.r2i.copy_from_slice(&material[16..32]);
    keys.attestation_challenge.copy_from_slice(&material[32..]);
    material.zeroize();
    Ok(keys)
}

/// An established secure session.
#[derive(Debug)]
pub struct Session {
    local_session_id: u16,
    peer_session_id: u16,
    encrypt_key: [u8; AEAD_KEY_SIZE],
    decrypt_key: [u8; AEAD_KEY_SIZE],
    attestation_challenge: [u8; ATTESTATION_CHALLENGE_SIZE],
    role: SessionRole,
    auth_mode: AuthMode,
    local_node_id: u64,
    peer_node_id: u64,
    fabric_index: u8,
    tx_counter: MessageCounter,
    rx_window: ReplayWindow,
}

impl Session {
    /// Build a session from freshly derived keys.
    ///
    /// Key direction follows the role: the initiator encrypts with I2R and
    /// decrypts with R2I, the responder the other way around.
    pub fn new(
        role: SessionRole,
        auth_mode: AuthMode,
        local_session_id: u16,
        peer_session_id: u16,
        keys: &SessionKeys,
    ) -> Self {
        let (encrypt_key, decrypt_key) = match role {
            SessionRole::Initiator => (keys.i2r, keys.r2i),
            SessionRole::Responder => (keys.r2i, keys.i2r),
        };
        Self {
            local_session_id,
            peer_session_id,
            encrypt_key,
            decrypt_key,
            attestation_challenge: keys.attestation_challenge,
            role,
            auth_mode,
            local_node_id: 0,
            peer_node_id: 0,
            fabric_index: 0,
            tx_counter: MessageCounter::random(),
            rx_window: ReplayWindow::new(),
        }
    }

    /// Attach operational identities (CASE sessions).
    pub fn with_peers(mut self, local_node_id: u64, peer_node_id: u64, fabric_index: u8) -> Self {
        self.local_node_id = local_node_id;
        self.peer_node_id = peer_node_id;
        self.fabric_index = fabric_index;
        self
    }

    /// Local session id (the one peers put on frames to us).
    pub fn local_session_id(&self) -> u16 {
        self.local_session_id
    }

    /// Peer session id (the one we put on outbound frames).
    pub fn peer_session_id(&self) -> u16 {
        self.peer_session_id
    }

    /// This side's role in the establishing handshake.
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// How the peer authenticated.
    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Peer operational node id (zero on PASE sessions).
    pub fn peer_node_id(&self) -> u64 {
        self.peer_node_id
    }

    /// Local operational node id (zero on PASE sessions).
    pub fn local_node_id(&self) -> u64 {
        self.local_node_id
    }

    /// Fabric the session is scoped to (zero on PASE sessions).
    pub fn fabric_index(&self) -> u8 {
        self.fabric_index
    }

    /// Attestation challenge bound to this session.
    pub fn attestation_challenge(&self) -> &[u8; ATTESTATION_CHALLENGE_SIZE] {
        &self.attestation_challenge
    }

    /// Key used for outbound frames.
    pub fn encrypt_key(&self) -> &[u8; AEAD_KEY_SIZE] {
        &self.encrypt_key
    }

    /// Key used for inbound frames.
    pub fn decrypt_key(&self) -> &[u8; AEAD_KEY_SIZE] {
        &self.decrypt_key
    }

    /// Seal encoded protocol-header bytes into an outbound frame.
    pub fn seal(&mut self, proto_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let header = MessageHeader {
            session_id: self.peer_session_id,
            security_flags: 0,
            counter: self.tx_counter.next(),
            source: None,
            destination: message::Destination::None,
        };
        message::seal(&header, &self.encrypt_key, self.local_node_id, proto_bytes)
    }

    /// Open an inbound frame: session-id check, replay pre-check, AEAD open,
    /// replay-window commit.
    ///
    /// The replay check runs before the AEAD and the window is only updated
    /// after the tag verifies, so unauthenticated frames cannot move it.
    pub fn open(&mut self, bytes: &[u8]) -> Result<(MessageHeader, Vec<u8>), StackError> {
        let (header, _) = MessageHeader::decode(bytes)?;
        if header.session_id != self.local_session_id {
            return Err(SessionError::SessionMismatch.into());
        }
        if self.rx_window.is_duplicate(header.counter) {
            return Err(SessionError::Duplicate.into());
        }
        let (header, plaintext) = message::open(bytes, &self.decrypt_key, self.peer_node_id)
            .map_err(|err| match err {
                message::OpenError::Frame(e) => StackError::Frame(e),
                message::OpenError::Crypto(e) => StackError::Crypto(e),
            })?;
        self.rx_window.record(header.counter);
        Ok((header, plaintext))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.encrypt_key.zeroize();
        self.decrypt_key.zeroize();
        self.attestation_challenge.zeroize();
    }
}
