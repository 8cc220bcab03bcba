//! CASE: certificate-authenticated session establishment (Sigma exchange).
//!
//! ```text
//! initiator                              responder
//!   Sigma1 (random, session id,
//!           destination id, eph pub) -->   destination check
//!                                   <--   Sigma2 (random, session id,
//!                                                 eph pub, encrypted2)
//!   verify NOC signature
//!   Sigma3 (encrypted3)             -->   verify NOC signature
//!                                   <--   StatusReport(success)
//! ```
//!
//! The destination id proves the initiator knows the fabric's IPK and is
//! addressing this node; the encrypted payloads carry each side's NOC and a
//! signature over the ephemeral keys, binding identity to the ECDH secret.

use crate::core::{
    random_bytes, random_session_id, HandshakeError, AEAD_NONCE_SIZE, OPCODE_CASE_SIGMA1,
    OPCODE_CASE_SIGMA2, OPCODE_CASE_SIGMA3, OPCODE_STATUS_REPORT, P256_PRIVATE_KEY_SIZE,
    P256_PUBLIC_KEY_SIZE,
};
use crate::crypto::{
    aes128_ccm_decrypt, aes128_ccm_encrypt, ecdh, hkdf_sha256, hmac_sha256, p256_keypair, sha256,
    sign_p256_sha256, verify_p256_sha256,
};
use crate::session::{derive_session_keys, AuthMode, SessionKeys, SessionRole};
use crate::tlv::{decode, TlvValue, TlvWriter};

use super::cert::decode_noc;
use super::{Established, StatusReport, StepResult};

const SIGMA2_INFO: &[u8] = b"Sigma2";
const SIGMA3_INFO: &[u8] = b"Sigma3";
const SIGMA2_NONCE: [u8; AEAD_NONCE_SIZE] = *b"NCASE_Sig2N\0\0";
const SIGMA3_NONCE: [u8; AEAD_NONCE_SIZE] = *b"NCASE_Sig3N\0\0";

const TAG_RANDOM: u8 = 1;
const TAG_SESSION_ID: u8 = 2;
const TAG_DESTINATION: u8 = 3;
const SIGMA1_TAG_EPH_PUB: u8 = 4;
const SIGMA2_TAG_EPH_PUB: u8 = 3;
const SIGMA2_TAG_ENCRYPTED: u8 = 4;
const SIGMA3_TAG_ENCRYPTED: u8 = 1;

const TBE_TAG_NOC: u8 = 1;
const TBE_TAG_ICAC: u8 = 2;
const TBE_TAG_SIGNATURE: u8 = 3;
const TBE_TAG_RESUMPTION_ID: u8 = 4;

/// Operational identity of this node on one fabric.
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// Identity protection key shared across the fabric.
    pub ipk: [u8; 16],
    /// Our operational node id.
    pub node_id: u64,
    /// Fabric id.
    pub fabric_id: u64,
    /// Local index the ACL uses for this fabric.
    pub fabric_index: u8,
    /// Our NOC (TLV or DER form).
    pub noc: Vec<u8>,
    /// Intermediate CA certificate, if the chain has one.
    pub icac: Option<Vec<u8>>,
    /// Operational signing key matching the NOC.
    pub op_private_key: [u8; P256_PRIVATE_KEY_SIZE],
}

impl FabricConfig {
    /// Destination id an initiator computes to address `node_id` on this
    /// fabric: `HMAC-SHA256(IPK, random ∥ node_id ∥ fabric_id)`.
    fn destination_id(&self, initiator_random: &[u8], node_id: u64) -> [u8; 32] {
        let mut message = Vec::with_capacity(initiator_random.len() + 16);
        message.extend_from_slice(initiator_random);
        message.extend_from_slice(&node_id.to_le_bytes());
        message.extend_from_slice(&self.fabric_id.to_le_bytes());
        hmac_sha256(&self.ipk, &message)
    }

    fn sigma_key(&self, shared: &[u8; 32], info: &[u8]) -> Result<[u8; 16], HandshakeError> {
        let mut key = [0u8; 16];
        hkdf_sha256(&self.ipk, shared, info, &mut key)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        Ok(key)
    }
}

/// Everything both sides feed into the session-key derivation.
fn case_session_keys(
    shared: &[u8; 32],
    sigma1: &[u8],
    sigma2: &[u8],
    sigma3: &[u8],
) -> Result<SessionKeys, HandshakeError> {
    let mut transcript = Vec::with_capacity(sigma1.len() + sigma2.len() + sigma3.len());
    transcript.extend_from_slice(sigma1);
    transcript.extend_from_slice(sigma2);
    transcript.extend_from_slice(sigma3);
    let transcript_hash = sha256(&transcript);

    let mut ikm = Vec::with_capacity(64);
    ikm.extend_from_slice(shared);
    ikm.extend_from_slice(&transcript_hash);
    derive_session_keys(&ikm).map_err(|_| HandshakeError::SessionEstablishmentFailed)
}

fn encode_tbe(
    noc: &[u8],
    icac: Option<&[u8]>,
    signature: &[u8; 64],
    resumption_id: Option<&[u8; 16]>,
) -> Vec<u8> {
    let mut w = TlvWriter::new();
    w.start_struct(None);
    w.octets(Some(TBE_TAG_NOC), noc);
    if let Some(icac) = icac {
        w.octets(Some(TBE_TAG_ICAC), icac);
    }
    w.octets(Some(TBE_TAG_SIGNATURE), signature);
    if let Some(id) = resumption_id {
        w.octets(Some(TBE_TAG_RESUMPTION_ID), id);
    }
    let _ = w.end_container();
    w.finish().expect("writer is balanced")
}

fn open_encrypted(
    encrypted: &[u8],
    key: &[u8; 16],
    nonce: &[u8; AEAD_NONCE_SIZE],
) -> Result<Vec<u8>, HandshakeError> {
    if encrypted.len() < 16 {
        return Err(HandshakeError::DecryptionFailed);
    }
    let (ciphertext, tag) = encrypted.split_at(encrypted.len() - 16);
    aes128_ccm_decrypt(ciphertext, tag, key, nonce, &[])
        .map_err(|_| HandshakeError::DecryptionFailed)
}

fn seal_encrypted(
    plaintext: &[u8],
    key: &[u8; 16],
    nonce: &[u8; AEAD_NONCE_SIZE],
) -> Result<Vec<u8>, HandshakeError> {
    let (mut ciphertext, tag) = aes128_ccm_encrypt(plaintext, key, nonce, &[])
        .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
    ciphertext.extend_from_slice(&tag);
    Ok(ciphertext)
}

enum ResponderState {
    Idle,
    Sigma2Sent {
        shared: [u8; 32],
        sigma1: Vec<u8>,
        sigma2: Vec<u8>,
        initiator_eph_pub: Vec<u8>,
        responder_eph_pub: [u8; P256_PUBLIC_KEY_SIZE],
        local_session_id: u16,
        peer_session_id: u16,
    },
}

/// Device (responder) side of CASE.
pub struct CaseResponder {
    config: FabricConfig,
    state: ResponderState,
}

impl CaseResponder {
    /// New machine in the idle state.
    pub fn new(config: FabricConfig) -> Self {
        Self { config, state: ResponderState::Idle }
    }

    /// Feed one secure-channel message.
    pub fn step(&mut self, opcode: u8, payload: &[u8]) -> Result<StepResult, HandshakeError> {
        let state = std::mem::replace(&mut self.state, ResponderState::Idle);
        match (state, opcode) {
            // Sigma1 always starts over, even mid-handshake.
            (_, OPCODE_CASE_SIGMA1) => self.on_sigma1(payload),
            (
                ResponderState::Sigma2Sent {
                    shared,
                    sigma1,
                    sigma2,
                    initiator_eph_pub,
                    responder_eph_pub,
                    local_session_id,
                    peer_session_id,
                },
                OPCODE_CASE_SIGMA3,
            ) => self.on_sigma3(
                payload,
                shared,
                sigma1,
                sigma2,
                initiator_eph_pub,
                responder_eph_pub,
                local_session_id,
                peer_session_id,
            ),
            _ => Err(HandshakeError::UnexpectedMessage),
        }
    }

    fn on_sigma1(&mut self, payload: &[u8]) -> Result<StepResult, HandshakeError> {
        let sigma1 = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let initiator_random = sigma1
            .field(TAG_RANDOM)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;
        let peer_session_id = sigma1
            .field(TAG_SESSION_ID)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(HandshakeError::InvalidMessage)?;
        let destination = sigma1
            .field(TAG_DESTINATION)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;
        let initiator_eph_pub = sigma1
            .field(SIGMA1_TAG_EPH_PUB)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;

        let expected = self.config.destination_id(initiator_random, self.config.node_id);
        if destination != expected {
            return Err(HandshakeError::DestinationMismatch);
        }

        let (responder_eph_pub, responder_eph_priv) = p256_keypair();
        let shared = ecdh(initiator_eph_pub, &responder_eph_priv)
            .map_err(|_| HandshakeError::InvalidMessage)?;

        // TBSData2 = H(Sigma1 ∥ NOC ∥ responder eph pub ∥ initiator eph pub)
        let mut tbs = payload.to_vec();
        tbs.extend_from_slice(&self.config.noc);
        tbs.extend_from_slice(&responder_eph_pub);
        tbs.extend_from_slice(initiator_eph_pub);
        let signature = sign_p256_sha256(&sha256(&tbs), &self.config.op_private_key)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        let resumption_id: [u8; 16] = random_bytes();
        let tbe2 = encode_tbe(
            &self.config.noc,
            self.config.icac.as_deref(),
            &signature,
            Some(&resumption_id),
        );
        let s2k = self.config.sigma_key(&shared, SIGMA2_INFO)?;
        let encrypted2 = seal_encrypted(&tbe2, &s2k, &SIGMA2_NONCE)?;

        let responder_random: [u8; 32] = random_bytes();
        let local_session_id = random_session_id();
        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(TAG_RANDOM), &responder_random);
        w.unsigned(Some(TAG_SESSION_ID), local_session_id as u64);
        w.octets(Some(SIGMA2_TAG_EPH_PUB), &responder_eph_pub);
        w.octets(Some(SIGMA2_TAG_ENCRYPTED), &encrypted2);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let sigma2 = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        self.state = ResponderState::Sigma2Sent {
            shared,
            sigma1: payload.to_vec(),
            sigma2: sigma2.clone(),
            initiator_eph_pub: initiator_eph_pub.to_vec(),
            responder_eph_pub,
            local_session_id,
            peer_session_id,
        };
        Ok(StepResult::reply(OPCODE_CASE_SIGMA2, sigma2))
    }

    #[allow(clippy::too_many_arguments)]
    fn on_sigma3(
        &mut self,
        payload: &[u8],
        shared: [u8; 32],
        sigma1: Vec<u8>,
        sigma2: Vec<u8>,
        initiator_eph_pub: Vec<u8>,
        responder_eph_pub: [u8; P256_PUBLIC_KEY_SIZE],
        local_session_id: u16,
        peer_session_id: u16,
    ) -> Result<StepResult, HandshakeError> {
        let sigma3 = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let encrypted3 = sigma3
            .field(SIGMA3_TAG_ENCRYPTED)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;

        let s3k = self.config.sigma_key(&shared, SIGMA3_INFO)?;
        let tbe3_bytes = open_encrypted(encrypted3, &s3k, &SIGMA3_NONCE)?;
        let tbe3 = decode(&tbe3_bytes).map_err(|_| HandshakeError::InvalidMessage)?;
        let noc = tbe3
            .field(TBE_TAG_NOC)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;
        let signature = tbe3
            .field(TBE_TAG_SIGNATURE)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;

        let peer = decode_noc(noc)?;
        if peer.fabric_id != self.config.fabric_id {
            return Err(HandshakeError::InvalidMessage);
        }

        // TBSData3 = H(Sigma1 ∥ Sigma2 ∥ NOC ∥ initiator eph pub ∥ responder eph pub)
        let mut tbs = Vec::with_capacity(sigma1.len() + sigma2.len() + noc.len() + 130);
        tbs.extend_from_slice(&sigma1);
        tbs.extend_from_slice(&sigma2);
        tbs.extend_from_slice(noc);
        tbs.extend_from_slice(&initiator_eph_pub);
        tbs.extend_from_slice(&responder_eph_pub);
        if !verify_p256_sha256(&sha256(&tbs), signature, &peer.public_key) {
            return Err(HandshakeError::SignatureVerificationFailed);
        }

        let keys = case_session_keys(&shared, &sigma1, &sigma2, payload)?;
        Ok(StepResult {
            reply: Some(super::HandshakeReply {
                opcode: OPCODE_STATUS_REPORT,
                payload: StatusReport::session_success().encode(),
            }),
            established: Some(Established {
                keys,
                role: SessionRole::Responder,
                local_session_id,
                peer_session_id,
                auth_mode: AuthMode::Case,
                local_node_id: self.config.node_id,
                peer_node_id: peer.node_id,
                fabric_index: self.config.fabric_index,
            }),
        })
    }
}

enum InitiatorState {
    Idle,
    Sigma1Sent {
        sigma1: Vec<u8>,
        eph_pub: [u8; P256_PUBLIC_KEY_SIZE],
        eph_priv: [u8; P256_PRIVATE_KEY_SIZE],
        peer_node_id: u64,
        local_session_id: u16,
    },
    Sigma3Sent(Box<Established>),
}

/// Commissioner (initiator) side of CASE.
pub struct CaseInitiator {
    config: FabricConfig,
    state: InitiatorState,
}

impl CaseInitiator {
    /// New machine in the idle state.
    pub fn new(config: FabricConfig) -> Self {
        Self { config, state: InitiatorState::Idle }
    }

    /// Open a handshake toward `peer_node_id` on our fabric.
    pub fn start(
        &mut self,
        local_session_id: u16,
        peer_node_id: u64,
    ) -> Result<StepResult, HandshakeError> {
        let initiator_random: [u8; 32] = random_bytes();
        let destination = self.config.destination_id(&initiator_random, peer_node_id);
        let (eph_pub, eph_priv) = p256_keypair();

        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(TAG_RANDOM), &initiator_random);
        w.unsigned(Some(TAG_SESSION_ID), local_session_id as u64);
        w.octets(Some(TAG_DESTINATION), &destination);
        w.octets(Some(SIGMA1_TAG_EPH_PUB), &eph_pub);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let sigma1 = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        self.state = InitiatorState::Sigma1Sent {
            sigma1: sigma1.clone(),
            eph_pub,
            eph_priv,
            peer_node_id,
            local_session_id,
        };
        Ok(StepResult::reply(OPCODE_CASE_SIGMA1, sigma1))
    }

    /// Feed one secure-channel message.
    pub fn step(&mut self, opcode: u8, payload: &[u8]) -> Result<StepResult, HandshakeError> {
        let state = std::mem::replace(&mut self.state, InitiatorState::Idle);
        match (state, opcode) {
            (
                InitiatorState::Sigma1Sent { sigma1, eph_pub, eph_priv, peer_node_id, local_session_id },
                OPCODE_CASE_SIGMA2,
            ) => self.on_sigma2(payload, sigma1, eph_pub, eph_priv, peer_node_id, local_session_id),
            (InitiatorState::Sigma3Sent(established), OPCODE_STATUS_REPORT) => {
                let report =
                    StatusReport::decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
                if !report.is_success() {
                    return Err(HandshakeError::SessionEstablishmentFailed);
                }
                Ok(StepResult { reply: None, established: Some(*established) })
            }
            _ => Err(HandshakeError::UnexpectedMessage),
        }
    }

    fn on_sigma2(
        &mut self,
        payload: &[u8],
        sigma1: Vec<u8>,
        eph_pub: [u8; P256_PUBLIC_KEY_SIZE],
        eph_priv: [u8; P256_PRIVATE_KEY_SIZE],
        peer_node_id: u64,
        local_session_id: u16,
    ) -> Result<StepResult, HandshakeError> {
        let sigma2 = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let peer_session_id = sigma2
            .field(TAG_SESSION_ID)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(HandshakeError::InvalidMessage)?;
        let responder_eph_pub = sigma2
            .field(SIGMA2_TAG_EPH_PUB)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;
        let encrypted2 = sigma2
            .field(SIGMA2_TAG_ENCRYPTED)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;

        let shared =
            ecdh(responder_eph_pub, &eph_priv).map_err(|_| HandshakeError::InvalidMessage)?;
        let s2k = self.config.sigma_key(&shared, SIGMA2_INFO)?;
        let tbe2_bytes = open_encrypted(encrypted2, &s2k, &SIGMA2_NONCE)?;
        let tbe2 = decode(&tbe2_bytes).map_err(|_| HandshakeError::InvalidMessage)?;
        let responder_noc = tbe2
            .field(TBE_TAG_NOC)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;
        let signature = tbe2
            .field(TBE_TAG_SIGNATURE)
            .and_then(TlvValue::as_bytes)
            .ok_or(HandshakeError::InvalidMessage)?;

        let peer = decode_noc(responder_noc)?;
        if peer.fabric_id != self.config.fabric_id || peer.node_id != peer_node_id {
            return Err(HandshakeError::InvalidMessage);
        }

        let mut tbs = sigma1.clone();
        tbs.extend_from_slice(responder_noc);
        tbs.extend_from_slice(responder_eph_pub);
        tbs.extend_from_slice(&eph_pub);
        if !verify_p256_sha256(&sha256(&tbs), signature, &peer.public_key) {
            return Err(HandshakeError::SignatureVerificationFailed);
        }

        // Our TBSData3 and the encrypted Sigma3 payload.
        let mut tbs3 = Vec::with_capacity(sigma1.len() + payload.len() + 256);
        tbs3.extend_from_slice(&sigma1);
        tbs3.extend_from_slice(payload);
        tbs3.extend_from_slice(&self.config.noc);
        tbs3.extend_from_slice(&eph_pub);
        tbs3.extend_from_slice(responder_eph_pub);
        let our_signature = sign_p256_sha256(&sha256(&tbs3), &self.config.op_private_key)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let tbe3 =
            encode_tbe(&self.config.noc, self.config.icac.as_deref(), &our_signature, None);
        let s3k = self.config.sigma_key(&shared, SIGMA3_INFO)?;
        let encrypted3 = seal_encrypted(&tbe3, &s3k, &SIGMA3_NONCE)?;

        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(SIGMA3_TAG_ENCRYPTED), &encrypted3);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let sigma3 = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        let keys = case_session_keys(&shared, &sigma1, payload, &sigma3)?;
        self.state = InitiatorState::Sigma3Sent(Box::new(Established {
            keys,
            role: SessionRole::Initiator,
            local_session_id,
            peer_session_id,
            auth_mode: AuthMode::Case,
            local_node_id: self.config.node_id,
            peer_node_id: peer.node_id,
            fabric_index: self.config.fabric_index,
        }));
        Ok(StepResult::reply(OPCODE_CASE_SIGMA3, sigma3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_channel::cert::encode_test_noc;

    const FABRIC_ID: u64 = 0x0000_0000_0000_FAB1;
    const IPK: [u8; 16] = [0x4A; 16];

    fn fabric_config(node_id: u64) -> FabricConfig {
        let (public_key, private_key) = p256_keypair();
        FabricConfig {
            ipk: IPK,
            node_id,
            fabric_id: FABRIC_ID,
            fabric_index: 1,
            noc: encode_test_noc(node_id, FABRIC_ID, &public_key),
            icac: None,
            op_private_key: private_key,
        }
    }

    fn run_handshake(
        initiator: &mut CaseInitiator,
        responder: &mut CaseResponder,
        target_node: u64,
    ) -> Result<(Established, Established), HandshakeError> {
        let sigma1 = initiator.start(0x7000, target_node)?.reply.unwrap();
        let step = responder.step(sigma1.opcode, &sigma1.payload)?;
        let sigma2 = step.reply.unwrap();
        let step = initiator.step(sigma2.opcode, &sigma2.payload)?;
        let sigma3 = step.reply.unwrap();
        let step = responder.step(sigma3.opcode, &sigma3.payload)?;
        let responder_done = step.established.unwrap();
        let status = step.reply.unwrap();
        let step = initiator.step(status.opcode, &status.payload)?;
        let initiator_done = step.established.unwrap();
        Ok((initiator_done, responder_done))
    }

    #[test]
    fn full_handshake_matches_crosswise() {
        let device = fabric_config(0x0000_0000_0000_00B0);
        let admin = fabric_config(0x0000_0000_0000_00A0);
        let mut responder = CaseResponder::new(device);
        let mut initiator = CaseInitiator::new(admin);

        let (initiator_done, responder_done) =
            run_handshake(&mut initiator, &mut responder, 0x0000_0000_0000_00B0).unwrap();

        assert_eq!(initiator_done.keys.i2r, responder_done.keys.i2r);
        assert_eq!(initiator_done.keys.r2i, responder_done.keys.r2i);
        assert_eq!(
            initiator_done.keys.attestation_challenge,
            responder_done.keys.attestation_challenge
        );
        assert_eq!(initiator_done.local_node_id, responder_done.peer_node_id);
        assert_eq!(initiator_done.peer_node_id, responder_done.local_node_id);
        assert_eq!(initiator_done.peer_session_id, responder_done.local_session_id);
        assert_eq!(initiator_done.local_session_id, responder_done.peer_session_id);
        assert_eq!(responder_done.auth_mode, AuthMode::Case);
    }

    #[test]
    fn wrong_destination_is_rejected() {
        let device = fabric_config(0xB0);
        let admin = fabric_config(0xA0);
        let mut responder = CaseResponder::new(device);
        let mut initiator = CaseInitiator::new(admin);

        // Addressed to a different node id than the responder's.
        let sigma1 = initiator.start(0x7000, 0xB1).unwrap().reply.unwrap();
        assert_eq!(
            responder.step(sigma1.opcode, &sigma1.payload).unwrap_err(),
            HandshakeError::DestinationMismatch
        );
    }

    #[test]
    fn mismatched_ipk_fails_to_decrypt() {
        let device = fabric_config(0xB0);
        let mut admin = fabric_config(0xA0);
        admin.ipk = [0x55; 16];
        let mut responder = CaseResponder::new(device);
        let mut initiator = CaseInitiator::new(admin);

        // Destination id already diverges under a different IPK.
        let sigma1 = initiator.start(0x7000, 0xB0).unwrap().reply.unwrap();
        assert_eq!(
            responder.step(sigma1.opcode, &sigma1.payload).unwrap_err(),
            HandshakeError::DestinationMismatch
        );
    }

    #[test]
    fn tampered_sigma3_fails() {
        let device = fabric_config(0xB0);
        let admin = fabric_config(0xA0);
        let mut responder = CaseResponder::new(device);
        let mut initiator = CaseInitiator::new(admin);

        let sigma1 = initiator.start(0x7000, 0xB0).unwrap().reply.unwrap();
        let sigma2 = responder.step(sigma1.opcode, &sigma1.payload).unwrap().reply.unwrap();
        let sigma3 = initiator.step(sigma2.opcode, &sigma2.payload).unwrap().reply.unwrap();

        let mut tampered = sigma3.payload.clone();
        let last = tampered.len() - 2;
        tampered[last] ^= 0x01;
        assert_eq!(
            responder.step(sigma3.opcode, &tampered).unwrap_err(),
            HandshakeError::DecryptionFailed
        );
    }

    #[test]
    fn out_of_order_sigma3_is_unexpected() {
        let device = fabric_config(0xB0);
        let mut responder = CaseResponder::new(device);
        assert_eq!(
            responder.step(OPCODE_CASE_SIGMA3, &[0x15, 0x18]).unwrap_err(),
            HandshakeError::UnexpectedMessage
        );
    }
}
