//! Message framing: headers, plaintext codec, AEAD-protected codec.
//!
//! A Matter frame is a variable-length message header, then either a
//! protocol header and payload in the clear (session id 0) or an
//! AES-128-CCM ciphertext of those two with the message header as
//! additional authenticated data.

mod codec;
mod header;

pub use codec::{decode_plaintext, encode_plaintext, nonce, open, seal, OpenError};
pub use header::{Destination, MessageHeader, ProtocolHeader, MESSAGE_VERSION};
pub use header::{
    SECURITY_FLAG_CONTROL, SECURITY_FLAG_EXTENSIONS, SECURITY_FLAG_PRIVACY,
    SECURITY_FLAG_SESSION_TYPE_MASK,
};
