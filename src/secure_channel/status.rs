//! StatusReport: the secure channel's fixed-layout result message.

use crate::core::{FrameError, PROTOCOL_ID_SECURE_CHANNEL};

/// General code: operation succeeded.
pub const GENERAL_CODE_SUCCESS: u16 = 0x0000;
/// General code: operation failed.
pub const GENERAL_CODE_FAILURE: u16 = 0x0001;

/// Secure-channel protocol code: session establishment succeeded.
pub const SC_STATUS_SESSION_SUCCESS: u16 = 0x0000;
/// Secure-channel protocol code: no shared trust roots.
pub const SC_STATUS_NO_SHARED_TRUST_ROOTS: u16 = 0x0001;
/// Secure-channel protocol code: invalid parameter.
pub const SC_STATUS_INVALID_PARAMETER: u16 = 0x0002;
/// Secure-channel protocol code: close session notification.
pub const SC_STATUS_CLOSE_SESSION: u16 = 0x0003;

/// Fixed 8-byte status message: general code, protocol id, protocol code.
///
/// ```text
/// +--------------+--------------+---------------+
/// | General Code | Protocol ID  | Protocol Code |
/// | 2 bytes LE   | 4 bytes LE   | 2 bytes LE    |
/// +--------------+--------------+---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    /// Outcome class.
    pub general_code: u16,
    /// Protocol the code below belongs to.
    pub protocol_id: u32,
    /// Protocol-scoped status code.
    pub protocol_code: u16,
}

impl StatusReport {
    /// Session-establishment success on the secure channel.
    pub fn session_success() -> Self {
        Self {
            general_code: GENERAL_CODE_SUCCESS,
            protocol_id: PROTOCOL_ID_SECURE_CHANNEL as u32,
            protocol_code: SC_STATUS_SESSION_SUCCESS,
        }
    }

    /// Whether this report signals success.
    pub fn is_success(&self) -> bool {
        self.general_code == GENERAL_CODE_SUCCESS
    }

    /// Serialize to the 8-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&self.general_code.to_le_bytes());
        buf.extend_from_slice(&self.protocol_id.to_le_bytes());
        buf.extend_from_slice(&self.protocol_code.to_le_bytes());
        buf
    }

    /// Parse from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 8 {
            return Err(FrameError::TruncatedProtoHeader);
        }
        Ok(Self {
            general_code: u16::from_le_bytes([bytes[0], bytes[1]]),
            protocol_id: u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            protocol_code: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}
