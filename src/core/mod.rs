//! Core constants, error taxonomy, and counters.
//!
//! Everything here is dependency-light and shared by the rest of the stack.

mod constants;
mod counter;
mod error;

pub use constants::*;
pub use counter::{random_bytes, random_session_id, ExchangeIdAllocator, MessageCounter};
pub use error::{
    CryptoError, FrameError, HandshakeError, ImError, SessionError, StackError, TlvError,
};
