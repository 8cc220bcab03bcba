//! Per-session subscription bookkeeping: interval timers and value caches.

use std::collections::BTreeMap;

use crate::tlv::TlvValue;

use super::path::{AttributePath, ConcretePath};

/// One live subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Server-assigned id.
    pub id: u32,
    /// Watched paths, wildcards included.
    pub paths: Vec<AttributePath>,
    /// Minimum seconds between reports.
    pub min_interval: u16,
    /// Maximum seconds without a report.
    pub max_interval: u16,
    last_report_at: u64,
    last_sent_at: u64,
    last_values: BTreeMap<ConcretePath, TlvValue>,
}

impl Subscription {
    /// Whether `current` differs from the values last reported.
    pub fn values_changed(&self, current: &BTreeMap<ConcretePath, TlvValue>) -> bool {
        self.last_values != *current
    }
}

/// All subscriptions of one session.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    next_id: u32,
    subscriptions: BTreeMap<u32, Subscription>,
}

impl SubscriptionManager {
    /// Empty manager; ids start at 1.
    pub fn new() -> Self {
        Self { next_id: 1, subscriptions: BTreeMap::new() }
    }

    /// Create a subscription; returns a fresh monotonically increasing id.
    ///
    /// The value cache starts empty and `last_sent_at` at zero, so the first
    /// tick after priming reports current values unthrottled.
    pub fn subscribe(
        &mut self,
        paths: Vec<AttributePath>,
        min_interval: u16,
        max_interval: u16,
        now_ms: u64,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                paths,
                min_interval,
                max_interval,
                last_report_at: now_ms,
                last_sent_at: 0,
                last_values: BTreeMap::new(),
            },
        );
        id
    }

    /// Drop a subscription; reports true when it existed.
    pub fn unsubscribe(&mut self, id: u32) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Drop everything (session teardown).
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    /// Look up one subscription.
    pub fn get(&self, id: u32) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    /// Iterate all subscriptions.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no subscriptions exist.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Ids whose maximum report interval has lapsed.
    pub fn due_reports(&self, now_ms: u64) -> Vec<u32> {
        self.subscriptions
            .values()
            .filter(|sub| now_ms.saturating_sub(sub.last_report_at) >= sub.max_interval as u64 * 1000)
            .map(|sub| sub.id)
            .collect()
    }

    /// Whether a report for `id` would violate the minimum interval.
    pub fn throttled(&self, id: u32, now_ms: u64) -> bool {
        let Some(sub) = self.subscriptions.get(&id) else {
            return false;
        };
        sub.last_sent_at > 0
            && now_ms.saturating_sub(sub.last_sent_at) < sub.min_interval as u64 * 1000
    }

    /// Record a report that carried values: updates both timestamps and the
    /// value cache.
    pub fn record_sent(
        &mut self,
        id: u32,
        now_ms: u64,
        values: BTreeMap<ConcretePath, TlvValue>,
    ) {
        if let Some(sub) = self.subscriptions.get_mut(&id) {
            sub.last_report_at = now_ms;
            sub.last_sent_at = now_ms;
            sub.last_values = values;
        }
    }

    /// Record that the subscription was serviced without a send (no diff
    /// observed): updates only the report timestamp.
    pub fn record_report(&mut self, id: u32, now_ms: u64) {
        if let Some(sub) = self.subscriptions.get_mut(&id) {
            sub.last_report_at = now_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> AttributePath {
        AttributePath::concrete(1, 0x0006, 0)
    }

    fn values(on: bool) -> BTreeMap<ConcretePath, TlvValue> {
        let mut map = BTreeMap::new();
        map.insert(
            ConcretePath { endpoint: 1, cluster: 0x0006, attribute: 0 },
            TlvValue::Bool(on),
        );
        map
    }

    #[test]
    fn ids_increase_monotonically() {
        let mut manager = SubscriptionManager::new();
        let a = manager.subscribe(vec![path()], 1, 60, 1_000);
        let b = manager.subscribe(vec![path()], 1, 60, 1_000);
        assert!(b > a);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn due_after_max_interval() {
        let mut manager = SubscriptionManager::new();
        let id = manager.subscribe(vec![path()], 1, 60, 0);
        assert!(manager.due_reports(59_999).is_empty());
        assert_eq!(manager.due_reports(60_000), vec![id]);

        manager.record_report(id, 60_000);
        assert!(manager.due_reports(60_001).is_empty());
        assert_eq!(manager.due_reports(120_000), vec![id]);
    }

    #[test]
    fn throttling_follows_min_interval() {
        let mut manager = SubscriptionManager::new();
        let id = manager.subscribe(vec![path()], 5, 60, 0);
        // Never sent: not throttled.
        assert!(!manager.throttled(id, 1));
        manager.record_sent(id, 1_000, values(true));
        assert!(manager.throttled(id, 5_999));
        assert!(!manager.throttled(id, 6_000));
    }

    #[test]
    fn value_diffing() {
        let mut manager = SubscriptionManager::new();
        let id = manager.subscribe(vec![path()], 1, 60, 0);
        // Cache starts empty: anything differs.
        assert!(manager.get(id).unwrap().values_changed(&values(false)));
        manager.record_sent(id, 1_000, values(false));
        assert!(!manager.get(id).unwrap().values_changed(&values(false)));
        assert!(manager.get(id).unwrap().values_changed(&values(true)));
    }

    #[test]
    fn unsubscribe_removes() {
        let mut manager = SubscriptionManager::new();
        let id = manager.subscribe(vec![path()], 1, 60, 0);
        assert!(manager.unsubscribe(id));
        assert!(!manager.unsubscribe(id));
        assert!(manager.is_empty());
    }
}
