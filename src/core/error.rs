//! Error types for the protocol core.

use thiserror::Error;

/// Errors raised while framing or parsing messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram ends before the message header does.
    #[error("truncated message header")]
    TruncatedHeader,

    /// Payload ends before the protocol header does.
    #[error("truncated protocol header")]
    TruncatedProtoHeader,

    /// Fewer than 16 bytes follow the header of an encrypted frame.
    #[error("truncated message integrity check")]
    TruncatedMic,

    /// Message version nibble is not a version this stack speaks.
    #[error("unsupported message version {0}")]
    UnsupportedVersion(u8),
}

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag mismatch on an incoming frame.
    #[error("message authentication failed")]
    AuthenticationFailed,

    /// An encrypted handshake payload failed to open.
    #[error("payload decryption failed")]
    DecryptionFailed,

    /// An ECDSA signature did not verify.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Key material could not be derived or imported.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Errors in session bookkeeping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Frame's session id does not match the session it was handed to.
    #[error("frame session id does not match session")]
    SessionMismatch,

    /// No session exists for the frame's session id.
    #[error("unknown session {0}")]
    UnknownSession(u16),

    /// Counter already seen or below the replay window.
    #[error("duplicate message counter")]
    Duplicate,
}

/// Errors while establishing a session (PASE or CASE).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Sigma1 destination id does not identify this node on any known fabric.
    #[error("destination id mismatch")]
    DestinationMismatch,

    /// SPAKE2+ confirmation code did not verify.
    #[error("pake confirmation failed")]
    ConfirmationFailed,

    /// Handshake could not complete (bad state, bad key material).
    #[error("session establishment failed")]
    SessionEstablishmentFailed,

    /// Opcode arrived that the current handshake state cannot accept.
    #[error("unexpected handshake message")]
    UnexpectedMessage,

    /// Handshake payload decoded but its content is invalid.
    #[error("invalid handshake message")]
    InvalidMessage,

    /// An encrypted handshake payload failed to open.
    #[error("payload decryption failed")]
    DecryptionFailed,

    /// An ECDSA signature did not verify.
    #[error("signature verification failed")]
    SignatureVerificationFailed,
}

/// Errors raised by the TLV codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlvError {
    /// Input ended inside an element.
    #[error("unexpected end of TLV input")]
    UnexpectedEof,

    /// Control byte carries an element type this codec does not accept.
    #[error("unknown TLV element type 0x{0:02x}")]
    UnknownType(u8),

    /// Control byte carries a tag form this codec does not accept.
    #[error("unsupported TLV tag control 0x{0:02x}")]
    UnsupportedTag(u8),

    /// Container opened without a matching end-of-container.
    #[error("unterminated TLV container")]
    UnterminatedContainer,

    /// End-of-container with no open container, or writer popped too far.
    #[error("unbalanced TLV container")]
    UnbalancedContainer,

    /// A UTF-8 string element holds invalid UTF-8.
    #[error("invalid UTF-8 in TLV string")]
    InvalidUtf8,
}

/// Errors in the Interaction Model codec and router.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImError {
    /// Payload is not well-formed TLV.
    #[error("invalid TLV payload: {0}")]
    InvalidTlv(#[from] TlvError),

    /// Opcode is not an Interaction Model message this stack handles.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Payload is well-formed TLV but not the expected message shape.
    #[error("message decode failed")]
    DecodeFailed,

    /// Frame targets a protocol id the exchange layer does not dispatch.
    #[error("unsupported protocol id 0x{0:04x}")]
    UnsupportedProtocol(u16),
}

/// Top-level error for the protocol core.
///
/// The orchestrator surfaces these through [`Output::Error`]; per the
/// propagation policy, framing and crypto failures are logged and dropped
/// rather than answered on the wire.
///
/// [`Output::Error`]: crate::node::Output::Error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StackError {
    /// Framing error.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Handshake error.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Interaction Model error.
    #[error("interaction model error: {0}")]
    Im(#[from] ImError),

    /// A reliable message exhausted its transmission budget.
    #[error("reliable delivery gave up on exchange {exchange_id}")]
    MrpGiveUp {
        /// Exchange whose pending message was abandoned.
        exchange_id: u16,
    },
}

impl From<TlvError> for StackError {
    fn from(err: TlvError) -> Self {
        StackError::Im(ImError::InvalidTlv(err))
    }
}
