//! Protocol constants fixed by the Matter specification.
//!
//! These values are fixed by the protocol and MUST NOT be changed.

// =============================================================================
// PROTOCOL IDS
// =============================================================================

/// Secure-channel protocol (handshakes, acks, status reports).
pub const PROTOCOL_ID_SECURE_CHANNEL: u16 = 0x0000;

/// Interaction Model protocol (read/write/invoke/subscribe).
pub const PROTOCOL_ID_INTERACTION_MODEL: u16 = 0x0001;

// =============================================================================
// SECURE-CHANNEL OPCODES
// =============================================================================

/// MRP standalone acknowledgement.
pub const OPCODE_MRP_STANDALONE_ACK: u8 = 0x10;

/// PASE: PBKDFParamRequest.
pub const OPCODE_PBKDF_PARAM_REQUEST: u8 = 0x20;

/// PASE: PBKDFParamResponse.
pub const OPCODE_PBKDF_PARAM_RESPONSE: u8 = 0x21;

/// PASE: Pake1 (prover share pA).
pub const OPCODE_PASE_PAKE1: u8 = 0x22;

/// PASE: Pake2 (verifier share pB + confirmation cB).
pub const OPCODE_PASE_PAKE2: u8 = 0x23;

/// PASE: Pake3 (prover confirmation cA).
pub const OPCODE_PASE_PAKE3: u8 = 0x24;

/// CASE: Sigma1.
pub const OPCODE_CASE_SIGMA1: u8 = 0x30;

/// CASE: Sigma2.
pub const OPCODE_CASE_SIGMA2: u8 = 0x31;

/// CASE: Sigma3.
pub const OPCODE_CASE_SIGMA3: u8 = 0x32;

/// StatusReport (handshake completion / failure signalling).
pub const OPCODE_STATUS_REPORT: u8 = 0x40;

// =============================================================================
// INTERACTION MODEL OPCODES
// =============================================================================

/// StatusResponse.
pub const OPCODE_IM_STATUS_RESPONSE: u8 = 0x01;

/// ReadRequest.
pub const OPCODE_IM_READ_REQUEST: u8 = 0x02;

/// SubscribeRequest.
pub const OPCODE_IM_SUBSCRIBE_REQUEST: u8 = 0x03;

/// SubscribeResponse.
pub const OPCODE_IM_SUBSCRIBE_RESPONSE: u8 = 0x04;

/// ReportData.
pub const OPCODE_IM_REPORT_DATA: u8 = 0x05;

/// WriteRequest.
pub const OPCODE_IM_WRITE_REQUEST: u8 = 0x06;

/// WriteResponse.
pub const OPCODE_IM_WRITE_RESPONSE: u8 = 0x07;

/// InvokeRequest.
pub const OPCODE_IM_INVOKE_REQUEST: u8 = 0x08;

/// InvokeResponse.
pub const OPCODE_IM_INVOKE_RESPONSE: u8 = 0x09;

/// TimedRequest.
pub const OPCODE_IM_TIMED_REQUEST: u8 = 0x0A;

// =============================================================================
// CRYPTOGRAPHIC SIZES
// =============================================================================

/// AES-128-CCM key size.
pub const AEAD_KEY_SIZE: usize = 16;

/// AES-128-CCM authentication tag (MIC) size.
pub const AEAD_TAG_SIZE: usize = 16;

/// AES-128-CCM nonce size: security flags (1) + counter (4) + source node (8).
pub const AEAD_NONCE_SIZE: usize = 13;

/// SHA-256 output size.
pub const SHA256_SIZE: usize = 32;

/// Uncompressed SEC1 P-256 public key size.
pub const P256_PUBLIC_KEY_SIZE: usize = 65;

/// P-256 scalar / private key size.
pub const P256_PRIVATE_KEY_SIZE: usize = 32;

/// Raw (r ∥ s) P-256 ECDSA signature size.
pub const P256_SIGNATURE_SIZE: usize = 64;

/// Attestation challenge carried by every session.
pub const ATTESTATION_CHALLENGE_SIZE: usize = 16;

/// HKDF output for session keys: I2R ∥ R2I ∥ attestation challenge.
pub const SESSION_KEY_MATERIAL_SIZE: usize = 48;

/// PBKDF2 output for the SPAKE2+ verifier material (w0s ∥ w1s).
pub const SPAKE2P_VERIFIER_MATERIAL_SIZE: usize = 80;

// =============================================================================
// SESSION
// =============================================================================

/// Received-counter replay window, in counter slots.
pub const REPLAY_WINDOW_SIZE: usize = 32;

// =============================================================================
// MESSAGE RELIABILITY PROTOCOL
// =============================================================================

/// Total transmission budget per reliable message (initial send + retries).
pub const MRP_MAX_TRANSMISSIONS: u32 = 5;

/// Retry interval base while the peer is known active (ms).
pub const MRP_BASE_INTERVAL_ACTIVE_MS: u64 = 300;

/// Retry interval base while the peer may be idle (ms).
pub const MRP_BASE_INTERVAL_IDLE_MS: u64 = 500;

/// Exponential backoff base applied per retransmission.
pub const MRP_BACKOFF_BASE: f64 = 1.6;

/// Fixed margin applied on top of the base interval.
pub const MRP_BACKOFF_MARGIN: f64 = 1.1;

/// Upper bound of the uniform backoff jitter fraction.
pub const MRP_BACKOFF_JITTER: f64 = 0.25;

/// Deadline for flushing a standalone ack when no reply piggybacks it (ms).
pub const MRP_STANDALONE_ACK_TIMEOUT_MS: u64 = 200;

// =============================================================================
// INTERACTION MODEL LIMITS
// =============================================================================

/// Encoded ReportData larger than this is split into chunks.
pub const REPORT_CHUNK_THRESHOLD: usize = 1150;

/// Attribute reports carried per chunk once chunking engages.
pub const REPORTS_PER_CHUNK: usize = 4;

/// Cluster id whose writes require Administer privilege.
pub const CLUSTER_ACCESS_CONTROL: u32 = 0x001F;
