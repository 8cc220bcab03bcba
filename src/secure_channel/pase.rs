//! PASE: passcode-authenticated session establishment over SPAKE2+.
//!
//! Both roles are symmetric state machines advanced by `(opcode, payload)`
//! pairs:
//!
//! ```text
//! commissioner                         device
//!   PBKDFParamRequest   ------------->   idle → pbkdf_sent
//!                       <-------------   PBKDFParamResponse
//!   Pake1 (pA)          ------------->   pake2_sent
//!                       <-------------   Pake2 (pB, cB)
//!   Pake3 (cA)          ------------->   established
//!                       <-------------   StatusReport(success)
//! ```
//!
//! The device precomputes its verifier `(w0, L)` from the passcode; the
//! commissioner derives `w0, w1` only after learning salt and iteration
//! count from the PBKDF exchange. The SHA-256 of that exchange binds the
//! SPAKE2+ transcript to this session attempt.

use crate::core::{
    random_bytes, random_session_id, HandshakeError, OPCODE_PASE_PAKE1, OPCODE_PASE_PAKE2,
    OPCODE_PASE_PAKE3, OPCODE_PBKDF_PARAM_REQUEST, OPCODE_PBKDF_PARAM_RESPONSE,
    OPCODE_STATUS_REPORT,
};
use crate::crypto::sha256;
use crate::crypto::spake2p::{PakeSecrets, PaseVerifier, Spake2pProver, Spake2pVerifier};
use crate::session::{derive_session_keys, AuthMode, SessionRole};
use crate::tlv::{decode, TlvValue, TlvWriter};

use super::{Established, StatusReport, StepResult};

/// Device-side PASE parameters, provisioned at manufacturing or pairing
/// window open.
#[derive(Debug, Clone)]
pub struct PaseConfig {
    /// Stored SPAKE2+ verifier `(w0, L)`.
    pub verifier: PaseVerifier,
    /// PBKDF salt handed to commissioners.
    pub salt: Vec<u8>,
    /// PBKDF iteration count handed to commissioners.
    pub iterations: u32,
}

enum DeviceState {
    Idle,
    PbkdfSent {
        context: [u8; 32],
        local_session_id: u16,
        peer_session_id: u16,
    },
    Pake2Sent {
        secrets: PakeSecrets,
        local_session_id: u16,
        peer_session_id: u16,
    },
}

/// Device (verifier) side of PASE.
pub struct PaseDevice {
    config: PaseConfig,
    state: DeviceState,
}

impl PaseDevice {
    /// New machine in the idle state.
    pub fn new(config: PaseConfig) -> Self {
        Self { config, state: DeviceState::Idle }
    }

    /// Feed one secure-channel message.
    ///
    /// Errors leave the machine reset to idle; per the propagation policy
    /// the caller drops the handshake without replying.
    pub fn step(&mut self, opcode: u8, payload: &[u8]) -> Result<StepResult, HandshakeError> {
        let state = std::mem::replace(&mut self.state, DeviceState::Idle);
        match (state, opcode) {
            (DeviceState::Idle, OPCODE_PBKDF_PARAM_REQUEST) => self.on_pbkdf_request(payload),
            (DeviceState::PbkdfSent { context, local_session_id, peer_session_id }, OPCODE_PASE_PAKE1) => {
                self.on_pake1(payload, context, local_session_id, peer_session_id)
            }
            (DeviceState::Pake2Sent { secrets, local_session_id, peer_session_id }, OPCODE_PASE_PAKE3) => {
                self.on_pake3(payload, secrets, local_session_id, peer_session_id)
            }
            // A new PBKDFParamRequest aborts any half-done attempt.
            (_, OPCODE_PBKDF_PARAM_REQUEST) => self.on_pbkdf_request(payload),
            _ => Err(HandshakeError::UnexpectedMessage),
        }
    }

    fn on_pbkdf_request(&mut self, payload: &[u8]) -> Result<StepResult, HandshakeError> {
        let request = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let initiator_random =
            request.field(1).and_then(TlvValue::as_bytes).ok_or(HandshakeError::InvalidMessage)?;
        if initiator_random.len() != 32 {
            return Err(HandshakeError::InvalidMessage);
        }
        let peer_session_id = request
            .field(2)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(HandshakeError::InvalidMessage)?;

        let local_session_id = random_session_id();
        let responder_random: [u8; 32] = random_bytes();
        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(1), &responder_random);
        w.unsigned(Some(2), local_session_id as u64);
        w.start_struct(Some(3));
        w.unsigned(Some(1), self.config.iterations as u64);
        w.octets(Some(2), &self.config.salt);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let response = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        let mut transcript = payload.to_vec();
        transcript.extend_from_slice(&response);
        self.state = DeviceState::PbkdfSent {
            context: sha256(&transcript),
            local_session_id,
            peer_session_id,
        };
        Ok(StepResult::reply(OPCODE_PBKDF_PARAM_RESPONSE, response))
    }

    fn on_pake1(
        &mut self,
        payload: &[u8],
        context: [u8; 32],
        local_session_id: u16,
        peer_session_id: u16,
    ) -> Result<StepResult, HandshakeError> {
        let pake1 = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let p_a =
            pake1.field(1).and_then(TlvValue::as_bytes).ok_or(HandshakeError::InvalidMessage)?;

        let verifier = Spake2pVerifier::new(&self.config.verifier)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let (p_b, secrets) = verifier
            .respond(p_a, &context)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(1), &p_b);
        w.octets(Some(2), &secrets.c_b);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let response = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        self.state = DeviceState::Pake2Sent { secrets, local_session_id, peer_session_id };
        Ok(StepResult::reply(OPCODE_PASE_PAKE2, response))
    }

    fn on_pake3(
        &mut self,
        payload: &[u8],
        secrets: PakeSecrets,
        local_session_id: u16,
        peer_session_id: u16,
    ) -> Result<StepResult, HandshakeError> {
        let pake3 = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let c_a =
            pake3.field(1).and_then(TlvValue::as_bytes).ok_or(HandshakeError::InvalidMessage)?;
        if c_a != secrets.c_a {
            return Err(HandshakeError::ConfirmationFailed);
        }

        let keys = derive_session_keys(&secrets.ke)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
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
                auth_mode: AuthMode::Pase,
                local_node_id: 0,
                peer_node_id: 0,
                fabric_index: 0,
            }),
        })
    }
}

enum CommissionerState {
    Idle,
    RequestSent {
        request: Vec<u8>,
        local_session_id: u16,
    },
    Pake1Sent {
        prover: Spake2pProver,
        context: [u8; 32],
        local_session_id: u16,
        peer_session_id: u16,
    },
    Pake3Sent {
        ke: [u8; 16],
        local_session_id: u16,
        peer_session_id: u16,
    },
}

/// Commissioner (prover) side of PASE.
pub struct PaseCommissioner {
    passcode: u32,
    state: CommissionerState,
}

impl PaseCommissioner {
    /// New machine holding the setup passcode.
    pub fn new(passcode: u32) -> Self {
        Self { passcode, state: CommissionerState::Idle }
    }

    /// Open the handshake: produce the PBKDFParamRequest.
    pub fn start(&mut self, local_session_id: u16) -> Result<StepResult, HandshakeError> {
        let initiator_random: [u8; 32] = random_bytes();
        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(1), &initiator_random);
        w.unsigned(Some(2), local_session_id as u64);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let request = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        self.state = CommissionerState::RequestSent { request: request.clone(), local_session_id };
        Ok(StepResult::reply(OPCODE_PBKDF_PARAM_REQUEST, request))
    }

    /// Feed one secure-channel message.
    pub fn step(&mut self, opcode: u8, payload: &[u8]) -> Result<StepResult, HandshakeError> {
        let state = std::mem::replace(&mut self.state, CommissionerState::Idle);
        match (state, opcode) {
            (CommissionerState::RequestSent { request, local_session_id }, OPCODE_PBKDF_PARAM_RESPONSE) => {
                self.on_pbkdf_response(payload, request, local_session_id)
            }
            (
                CommissionerState::Pake1Sent { prover, context, local_session_id, peer_session_id },
                OPCODE_PASE_PAKE2,
            ) => self.on_pake2(payload, prover, context, local_session_id, peer_session_id),
            (CommissionerState::Pake3Sent { ke, local_session_id, peer_session_id }, OPCODE_STATUS_REPORT) => {
                self.on_status(payload, ke, local_session_id, peer_session_id)
            }
            _ => Err(HandshakeError::UnexpectedMessage),
        }
    }

    fn on_pbkdf_response(
        &mut self,
        payload: &[u8],
        request: Vec<u8>,
        local_session_id: u16,
    ) -> Result<StepResult, HandshakeError> {
        let response = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let peer_session_id = response
            .field(2)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(HandshakeError::InvalidMessage)?;
        let params = response.field(3).ok_or(HandshakeError::InvalidMessage)?;
        let iterations = params
            .field(1)
            .and_then(TlvValue::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(HandshakeError::InvalidMessage)?;
        let salt =
            params.field(2).and_then(TlvValue::as_bytes).ok_or(HandshakeError::InvalidMessage)?;

        let mut transcript = request;
        transcript.extend_from_slice(payload);
        let context = sha256(&transcript);

        let prover = Spake2pProver::new(self.passcode, salt, iterations)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let p_a = prover.share();

        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(1), &p_a);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let pake1 = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        self.state = CommissionerState::Pake1Sent { prover, context, local_session_id, peer_session_id };
        Ok(StepResult::reply(OPCODE_PASE_PAKE1, pake1))
    }

    fn on_pake2(
        &mut self,
        payload: &[u8],
        prover: Spake2pProver,
        context: [u8; 32],
        local_session_id: u16,
        peer_session_id: u16,
    ) -> Result<StepResult, HandshakeError> {
        let pake2 = decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        let p_b =
            pake2.field(1).and_then(TlvValue::as_bytes).ok_or(HandshakeError::InvalidMessage)?;
        let c_b =
            pake2.field(2).and_then(TlvValue::as_bytes).ok_or(HandshakeError::InvalidMessage)?;

        let secrets = prover
            .complete(p_b, &context)
            .map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        if c_b != secrets.c_b {
            return Err(HandshakeError::ConfirmationFailed);
        }

        let mut w = TlvWriter::new();
        w.start_struct(None);
        w.octets(Some(1), &secrets.c_a);
        w.end_container().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        let pake3 = w.finish().map_err(|_| HandshakeError::SessionEstablishmentFailed)?;

        self.state = CommissionerState::Pake3Sent { ke: secrets.ke, local_session_id, peer_session_id };
        Ok(StepResult::reply(OPCODE_PASE_PAKE3, pake3))
    }

    fn on_status(
        &mut self,
        payload: &[u8],
        ke: [u8; 16],
        local_session_id: u16,
        peer_session_id: u16,
    ) -> Result<StepResult, HandshakeError> {
        let report = StatusReport::decode(payload).map_err(|_| HandshakeError::InvalidMessage)?;
        if !report.is_success() {
            return Err(HandshakeError::SessionEstablishmentFailed);
        }
        let keys =
            derive_session_keys(&ke).map_err(|_| HandshakeError::SessionEstablishmentFailed)?;
        Ok(StepResult {
            reply: None,
            established: Some(Established {
                keys,
                role: SessionRole::Initiator,
                local_session_id,
                peer_session_id,
                auth_mode: AuthMode::Pase,
                local_node_id: 0,
                peer_node_id: 0,
                fabric_index: 0,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::spake2p::compute_verifier;

    const PASSCODE: u32 = 20202021;
    const ITERATIONS: u32 = 1000;

    fn device() -> PaseDevice {
        let salt = [0x73; 32];
        PaseDevice::new(PaseConfig {
            verifier: compute_verifier(PASSCODE, &salt, ITERATIONS),
            salt: salt.to_vec(),
            iterations: ITERATIONS,
        })
    }

    /// Drive a full handshake; returns both `Established` results.
    fn run_handshake(passcode: u32) -> Result<(Established, Established), HandshakeError> {
        let mut device = device();
        let mut commissioner = PaseCommissioner::new(passcode);

        let mut to_device = commissioner.start(0x5000)?.reply.unwrap();
        let mut device_done = None;
        let mut commissioner_done = None;
        for _ in 0..8 {
            let step = device.step(to_device.opcode, &to_device.payload)?;
            if let Some(est) = step.established {
                device_done = Some(est);
            }
            let Some(to_commissioner) = step.reply else { break };
            let step = commissioner.step(to_commissioner.opcode, &to_commissioner.payload)?;
            if let Some(est) = step.established {
                commissioner_done = Some(est);
                break;
            }
            match step.reply {
                Some(reply) => to_device = reply,
                None => break,
            }
        }
        Ok((device_done.unwrap(), commissioner_done.unwrap()))
    }

    #[test]
    fn full_handshake_derives_matching_keys() {
        let (device, commissioner) = run_handshake(PASSCODE).unwrap();

        assert_eq!(device.keys.i2r, commissioner.keys.i2r);
        assert_eq!(device.keys.r2i, commissioner.keys.r2i);
        assert_eq!(
            device.keys.attestation_challenge,
            commissioner.keys.attestation_challenge
        );
        assert_eq!(device.keys.attestation_challenge.len(), 16);
        // Session ids are exchanged crosswise.
        assert_eq!(device.local_session_id, commissioner.peer_session_id);
        assert_eq!(device.peer_session_id, commissioner.local_session_id);
        assert_eq!(commissioner.peer_session_id, device.local_session_id);
        assert_eq!(device.auth_mode, AuthMode::Pase);
    }

    #[test]
    fn wrong_passcode_fails_confirmation() {
        assert_eq!(
            run_handshake(PASSCODE + 1).unwrap_err(),
            HandshakeError::ConfirmationFailed
        );
    }

    #[test]
    fn device_rejects_out_of_order_messages() {
        let mut device = device();
        assert_eq!(
            device.step(OPCODE_PASE_PAKE3, &[0x15, 0x18]).unwrap_err(),
            HandshakeError::UnexpectedMessage
        );
    }

    #[test]
    fn new_request_restarts_a_stale_attempt() {
        let mut device = device();
        let mut commissioner = PaseCommissioner::new(PASSCODE);
        let request = commissioner.start(0x5000).unwrap().reply.unwrap();
        device.step(request.opcode, &request.payload).unwrap();
        // A second request from scratch is accepted, not rejected.
        let mut second = PaseCommissioner::new(PASSCODE);
        let request = second.start(0x5001).unwrap().reply.unwrap();
        assert!(device.step(request.opcode, &request.payload).is_ok());
    }
}
