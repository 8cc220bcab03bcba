//! Monotonic message counters and random id allocation.

use rand::rngs::OsRng;
use rand::RngCore;

/// Outbound message counter: random initial value, strictly monotonic,
/// wrapping at 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCounter(u32);

impl MessageCounter {
    /// Create a counter starting at a random value.
    pub fn random() -> Self {
        Self(OsRng.next_u32())
    }

    /// Create a counter starting at a known value.
    pub fn starting_at(value: u32) -> Self {
        Self(value)
    }

    /// Value that the next [`MessageCounter::next`] call will return.
    pub fn peek(&self) -> u32 {
        self.0
    }

    /// Take the current value and advance.
    pub fn next(&mut self) -> u32 {
        let value = self.0;
        self.0 = self.0.wrapping_add(1);
        value
    }
}

/// Allocates exchange ids for locally initiated exchanges.
///
/// Ids start at a random point and increment with wrap; collision with a
/// live peer-initiated exchange is resolved by the exchange table, not here.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeIdAllocator(u16);

impl ExchangeIdAllocator {
    /// Create an allocator starting at a random id.
    pub fn random() -> Self {
        Self((OsRng.next_u32() & 0xFFFF) as u16)
    }

    /// Allocate the next exchange id.
    pub fn next(&mut self) -> u16 {
        let id = self.0;
        self.0 = self.0.wrapping_add(1);
        id
    }
}

/// Fill a fixed-size buffer with cryptographically random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Random nonzero u16, used for local session id allocation.
pub fn random_session_id() -> u16 {
    loop {
        let id = (OsRng.next_u32() & 0xFFFF) as u16;
        if id != 0 {
            return id;
        }
    }
}
