//! Message Reliability Protocol: pending-send table and backoff.
//!
//! MRP owns the exact encoded protocol-header bytes of every unacknowledged
//! reliable message, so retransmits are independent of the encoder and of
//! any state that changed since the first send. Timers live in the host;
//! the table only accounts for attempts.

use std::collections::HashMap;

use rand::Rng;

use crate::core::{
    MRP_BACKOFF_BASE, MRP_BACKOFF_JITTER, MRP_BACKOFF_MARGIN, MRP_BASE_INTERVAL_ACTIVE_MS,
    MRP_BASE_INTERVAL_IDLE_MS, MRP_MAX_TRANSMISSIONS,
};

/// What a fired retransmission timer means for an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Send these bytes again and schedule the next timeout.
    Retransmit(Vec<u8>),
    /// Transmission budget exhausted; the exchange is gone.
    GiveUp,
    /// The message was acknowledged (or the timer is stale); nothing to do.
    AlreadyAcked,
}

#[derive(Debug)]
struct PendingSend {
    message: Vec<u8>,
    attempt: u32,
}

/// Pending reliable sends, keyed by exchange id.
#[derive(Debug, Default)]
pub struct MrpTable {
    pending: HashMap<u16, PendingSend>,
}

impl MrpTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly sent reliable message.
    ///
    /// A second send on the same exchange replaces the first; only one
    /// reliable message is in flight per exchange.
    pub fn record_send(&mut self, exchange_id: u16, message: Vec<u8>) {
        self.pending.insert(exchange_id, PendingSend { message, attempt: 0 });
    }

    /// Account for a fired timer carrying the attempt number it was armed
    /// with. Stale timers (attempt mismatch) and acked exchanges report
    /// [`TimeoutAction::AlreadyAcked`].
    pub fn on_timeout(&mut self, exchange_id: u16, attempt: u32) -> TimeoutAction {
        let Some(entry) = self.pending.get_mut(&exchange_id) else {
            return TimeoutAction::AlreadyAcked;
        };
        if entry.attempt != attempt {
            return TimeoutAction::AlreadyAcked;
        }
        if entry.attempt + 1 >= MRP_MAX_TRANSMISSIONS {
            self.pending.remove(&exchange_id);
            return TimeoutAction::GiveUp;
        }
        entry.attempt += 1;
        TimeoutAction::Retransmit(entry.message.clone())
    }

    /// Clear the pending send for an acknowledged exchange.
    ///
    /// Returns whether anything was pending.
    pub fn on_ack(&mut self, exchange_id: u16) -> bool {
        self.pending.remove(&exchange_id).is_some()
    }

    /// Whether an exchange has a message in flight.
    pub fn has_pending(&self, exchange_id: u16) -> bool {
        self.pending.contains_key(&exchange_id)
    }

    /// Number of messages in flight.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Deterministic backoff: `trunc(base · 1.1 · 1.6^attempt)` ms, base 300
/// (peer active) or 500 (peer possibly idle).
pub fn backoff_ms(active: bool, attempt: u32) -> u64 {
    let base = if active { MRP_BASE_INTERVAL_ACTIVE_MS } else { MRP_BASE_INTERVAL_IDLE_MS };
    (base as f64 * MRP_BACKOFF_MARGIN * MRP_BACKOFF_BASE.powi(attempt as i32)) as u64
}

/// [`backoff_ms`] with the protocol's uniform jitter in `[0, 0.25]` applied.
pub fn jittered_backoff_ms(active: bool, attempt: u32) -> u64 {
    let jitter = 1.0 + rand::thread_rng().gen_range(0.0..=MRP_BACKOFF_JITTER);
    (backoff_ms(active, attempt) as f64 * jitter) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retransmit_schedule_then_give_up() {
        let mut table = MrpTable::new();
        table.record_send(1, b"msg".to_vec());

        for attempt in 0..4 {
            assert_eq!(
                table.on_timeout(1, attempt),
                TimeoutAction::Retransmit(b"msg".to_vec()),
                "attempt {attempt}"
            );
        }
        assert_eq!(table.on_timeout(1, 4), TimeoutAction::GiveUp);
        assert!(table.is_empty());
        assert_eq!(table.on_timeout(1, 5), TimeoutAction::AlreadyAcked);
    }

    #[test]
    fn ack_stops_retransmission() {
        let mut table = MrpTable::new();
        table.record_send(7, b"x".to_vec());
        assert!(table.on_ack(7));
        assert!(!table.on_ack(7));
        assert_eq!(table.on_timeout(7, 0), TimeoutAction::AlreadyAcked);
    }

    #[test]
    fn stale_timer_is_ignored() {
        let mut table = MrpTable::new();
        table.record_send(3, b"y".to_vec());
        assert!(matches!(table.on_timeout(3, 0), TimeoutAction::Retransmit(_)));
        // The attempt-0 timer fires again late.
        assert_eq!(table.on_timeout(3, 0), TimeoutAction::AlreadyAcked);
        assert!(matches!(table.on_timeout(3, 1), TimeoutAction::Retransmit(_)));
    }

    #[test]
    fn unknown_exchange_is_already_acked() {
        let mut table = MrpTable::new();
        assert_eq!(table.on_timeout(99, 0), TimeoutAction::AlreadyAcked);
    }

    #[test]
    fn deterministic_backoff_values() {
        assert_eq!(backoff_ms(true, 0), 330);
        assert_eq!(backoff_ms(true, 1), 528);
        assert_eq!(backoff_ms(true, 2), 844);
        assert_eq!(backoff_ms(true, 3), 1351);
        assert_eq!(backoff_ms(false, 0), 550);
    }

    #[test]
    fn jitter_stays_in_range() {
        for attempt in 0..4 {
            let base = backoff_ms(true, attempt);
            for _ in 0..32 {
                let jittered = jittered_backoff_ms(true, attempt);
                assert!(jittered >= base);
                assert!(jittered <= (base as f64 * 1.25) as u64 + 1);
            }
        }
    }
}
