//! Secure-channel protocol: session establishment and status reports.
//!
//! Two handshakes produce sessions. PASE authenticates with a setup
//! passcode over SPAKE2+ during commissioning; CASE authenticates with
//! operational certificates over a Sigma exchange once the device is on a
//! fabric. Both are modeled the same way: a state value advanced by feeding
//! it `(opcode, payload)` pairs, emitting at most one reply frame and, at
//! the end, the material for a new [`Session`].
//!
//! [`Session`]: crate::session::Session

mod case;
mod cert;
mod pase;
mod status;

pub use case::{CaseInitiator, CaseResponder, FabricConfig};
pub use cert::{decode_noc, encode_test_noc, NocInfo};
pub use pase::{PaseCommissioner, PaseConfig, PaseDevice};
pub use status::{
    StatusReport, GENERAL_CODE_FAILURE, GENERAL_CODE_SUCCESS, SC_STATUS_CLOSE_SESSION,
    SC_STATUS_INVALID_PARAMETER, SC_STATUS_NO_SHARED_TRUST_ROOTS, SC_STATUS_SESSION_SUCCESS,
};

use crate::session::{AuthMode, SessionKeys, SessionRole};

/// One outbound handshake frame: opcode plus encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReply {
    /// Secure-channel opcode.
    pub opcode: u8,
    /// Encoded payload (TLV or StatusReport binary).
    pub payload: Vec<u8>,
}

/// Everything the orchestrator needs to mint a session.
#[derive(Debug)]
pub struct Established {
    /// Derived directional keys and attestation challenge.
    pub keys: SessionKeys,
    /// Role this side played.
    pub role: SessionRole,
    /// Session id peers must put on frames to us.
    pub local_session_id: u16,
    /// Session id we put on frames to the peer.
    pub peer_session_id: u16,
    /// PASE or CASE.
    pub auth_mode: AuthMode,
    /// Our operational node id (zero for PASE).
    pub local_node_id: u64,
    /// Peer operational node id (zero for PASE).
    pub peer_node_id: u64,
    /// Fabric the session is scoped to (zero for PASE).
    pub fabric_index: u8,
}

/// Result of feeding one message to a handshake state machine.
#[derive(Debug, Default)]
pub struct StepResult {
    /// Frame to send back, if any.
    pub reply: Option<HandshakeReply>,
    /// Present exactly once, when the handshake completes.
    pub established: Option<Established>,
}

impl StepResult {
    fn reply(opcode: u8, payload: Vec<u8>) -> Self {
        Self { reply: Some(HandshakeReply { opcode, payload }), established: None }
    }
}
