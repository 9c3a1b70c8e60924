//! Per-traffic-class leaky-bucket admission.
//!
//! An [`AdmissionController`] holds one token bucket per traffic class, a
//! per-minute admission counter for every class with a configured capacity,
//! and an append-only history of flushed counters. All of it sits behind one
//! mutex, so concurrent [`AdmissionController::admit`] calls behave exactly as
//! if they had been processed one at a time in lock-acquisition order.

pub mod bucket;

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{
    ClassValue, ControllerSnapshot, HistoryRecord, Packet, TrafficClassKey, UnconfiguredPolicy,
};

use bucket::{can_consume, elapsed_minutes, minute_index, refill};

#[derive(Debug)]
pub struct AdmissionController {
    policy: UnconfiguredPolicy,
    state: Mutex<ControllerState>,
}

#[derive(Debug)]
struct ControllerState {
    device_id: i64,
    tokens: HashMap<TrafficClassKey, f64>,
    capacities: HashMap<TrafficClassKey, f64>,
    refill_rates: HashMap<TrafficClassKey, f64>,
    counters: HashMap<TrafficClassKey, u64>,
    history: Vec<HistoryRecord>,
    last_minute: i64,
    last_refill_time: f64,
}

impl AdmissionController {
    pub fn from_snapshot(snapshot: &ControllerSnapshot) -> Result<Self> {
        validate_snapshot(snapshot)?;
        Ok(Self {
            policy: UnconfiguredPolicy::default(),
            state: Mutex::new(ControllerState::assemble(snapshot)),
        })
    }

    /// New controller with this one's bucket tables and policy, fresh counters
    /// and an empty history. Used as the per-session factory.
    pub fn fork(&self) -> Self {
        Self {
            policy: self.policy,
            state: Mutex::new(ControllerState::assemble(&self.snapshot())),
        }
    }

    pub fn with_policy(mut self, policy: UnconfiguredPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> UnconfiguredPolicy {
        self.policy
    }

    pub fn device_id(&self) -> i64 {
        self.state.lock().device_id
    }

    /// Decides whether `packet` may enter the fabric at simulated time
    /// `sim_time` (seconds).
    ///
    /// Packets already addressed to a service (`destination_service_id != 0`)
    /// pass without touching any state. Everything else rolls the minute
    /// counters if needed, refills every bucket and then draws one token from
    /// the packet's class.
    pub fn admit(&self, packet: &Packet, sim_time: f64) -> bool {
        if packet.destination_service_id != 0 {
            return true;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.roll_minute(minute_index(sim_time));
        state.refill(sim_time);

        let key = packet.key();
        let admitted = match state.tokens.get_mut(&key) {
            None => match self.policy {
                UnconfiguredPolicy::FailOpen => {
                    state.count(key);
                    true
                }
                UnconfiguredPolicy::FailClosed => false,
            },
            Some(tokens) if can_consume(*tokens) => {
                *tokens -= 1.0;
                state.count(key);
                true
            }
            Some(_) => false,
        };

        debug!(
            device_id = state.device_id,
            class = %key,
            sim_time,
            admitted,
            "admission decision"
        );
        admitted
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.state.lock().history.clone()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// Current token balance of a class, `None` when the class has no bucket.
    pub fn tokens(&self, key: TrafficClassKey) -> Option<f64> {
        self.state.lock().tokens.get(&key).copied()
    }

    /// Packets admitted for `key` since the last minute boundary.
    pub fn admitted_this_minute(&self, key: TrafficClassKey) -> Option<u64> {
        self.state.lock().counters.get(&key).copied()
    }

    /// Exports the bucket tables, each sorted by class key.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state.lock();
        ControllerSnapshot {
            device_id: state.device_id,
            tokens: export_table(&state.tokens),
            capacities: export_table(&state.capacities),
            refill_rates: export_table(&state.refill_rates),
        }
    }

    /// Replaces the whole controller state with `snapshot` and hands back the
    /// history accumulated so far. The current state is left untouched when
    /// the snapshot does not validate.
    pub fn restore(&self, snapshot: &ControllerSnapshot) -> Result<Vec<HistoryRecord>> {
        validate_snapshot(snapshot)?;
        let next = ControllerState::assemble(snapshot);
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        info!(
            previous_device_id = previous.device_id,
            device_id = snapshot.device_id,
            history_records = previous.history.len(),
            "admission controller reconfigured"
        );
        Ok(previous.history)
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self {
            policy: UnconfiguredPolicy::default(),
            state: Mutex::new(ControllerState::assemble(&ControllerSnapshot::default())),
        }
    }
}

impl ControllerState {
    fn assemble(snapshot: &ControllerSnapshot) -> Self {
        let capacities = import_table(&snapshot.capacities);
        let counters = capacities.keys().map(|key| (*key, 0)).collect();
        Self {
            device_id: snapshot.device_id,
            tokens: import_table(&snapshot.tokens),
            capacities,
            refill_rates: import_table(&snapshot.refill_rates),
            counters,
            history: Vec::new(),
            last_minute: 0,
            last_refill_time: 0.0,
        }
    }

    fn roll_minute(&mut self, minute: i64) {
        if minute == self.last_minute {
            return;
        }

        let mut keys: Vec<TrafficClassKey> = self.counters.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            let admitted_count = self.counters.insert(key, 0).unwrap_or(0);
            self.history.push(HistoryRecord {
                minute_index: minute,
                device_id: self.device_id,
                service_chain_id: key.service_chain_id,
                user_level: key.user_level,
                admitted_count,
            });
        }

        debug!(
            device_id = self.device_id,
            from = self.last_minute,
            to = minute,
            flushed = self.counters.len(),
            "minute boundary crossed"
        );
        self.last_minute = minute;
    }

    fn refill(&mut self, sim_time: f64) {
        let elapsed = elapsed_minutes(self.last_refill_time, sim_time);
        for (key, tokens) in self.tokens.iter_mut() {
            match (self.capacities.get(key), self.refill_rates.get(key)) {
                (Some(capacity), Some(rate)) => {
                    *tokens = refill(*tokens, elapsed, *rate, *capacity);
                }
                _ => warn!(
                    device_id = self.device_id,
                    class = %key,
                    "missing capacity or refill rate for traffic class, skipping refill"
                ),
            }
        }
        self.last_refill_time = sim_time;
    }

    /// Counters are never created on demand.
    fn count(&mut self, key: TrafficClassKey) {
        if let Some(counter) = self.counters.get_mut(&key) {
            *counter += 1;
        }
    }
}

fn validate_snapshot(snapshot: &ControllerSnapshot) -> Result<()> {
    validate_table("tokens", &snapshot.tokens)?;
    validate_table("capacities", &snapshot.capacities)?;
    validate_table("refill_rates", &snapshot.refill_rates)?;

    for entry in &snapshot.tokens {
        let key = entry.key();
        if let Some(capacity) = snapshot.capacities.iter().find(|cap| cap.key() == key) {
            if entry.value > capacity.value {
                return Err(Error::TokensExceedCapacity {
                    key,
                    tokens: entry.value,
                    capacity: capacity.value,
                });
            }
        }
    }

    Ok(())
}

fn validate_table(table: &'static str, entries: &[ClassValue]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        let key = entry.key();
        if !seen.insert(key) {
            return Err(Error::DuplicateClassEntry { table, key });
        }
        if !entry.value.is_finite() || entry.value < 0.0 {
            return Err(Error::InvalidClassValue {
                table,
                key,
                value: entry.value,
            });
        }
    }
    Ok(())
}

fn import_table(entries: &[ClassValue]) -> HashMap<TrafficClassKey, f64> {
    entries
        .iter()
        .map(|entry| (entry.key(), entry.value))
        .collect()
}

fn export_table(table: &HashMap<TrafficClassKey, f64>) -> Vec<ClassValue> {
    let mut entries: Vec<ClassValue> = table
        .iter()
        .map(|(key, value)| ClassValue::new(*key, *value))
        .collect();
    entries.sort_by_key(ClassValue::key);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;
    use std::thread;

    const CLASS: TrafficClassKey = TrafficClassKey::new(1, 1);

    fn single_class(tokens: f64, capacity: f64, rate: f64) -> ControllerSnapshot {
        ControllerSnapshot {
            device_id: 1,
            tokens: vec![ClassValue::new(CLASS, tokens)],
            capacities: vec![ClassValue::new(CLASS, capacity)],
            refill_rates: vec![ClassValue::new(CLASS, rate)],
        }
    }

    fn packet(service_chain_id: i64, user_level: i64) -> Packet {
        Packet {
            destination_service_id: 0,
            service_chain_id,
            user_level,
        }
    }

    #[test]
    fn full_bucket_admits_capacity_then_denies() {
        let controller = AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0)).unwrap();
        for _ in 0..10 {
            assert!(controller.admit(&packet(1, 1), 0.0));
        }
        assert!(!controller.admit(&packet(1, 1), 0.0));
        assert_eq!(controller.tokens(CLASS), Some(0.0));
    }

    #[test]
    fn one_minute_refills_exactly_one_token() {
        let controller = AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0)).unwrap();
        for _ in 0..10 {
            controller.admit(&packet(1, 1), 0.0);
        }
        assert!(!controller.admit(&packet(1, 1), 0.0));

        assert!(controller.admit(&packet(1, 1), 60.0));
        assert!(!controller.admit(&packet(1, 1), 60.0));
    }

    #[test]
    fn addressed_packets_bypass_buckets() {
        let controller = AdmissionController::from_snapshot(&single_class(0.0, 10.0, 1.0)).unwrap();
        let addressed = Packet {
            destination_service_id: 4,
            service_chain_id: 1,
            user_level: 1,
        };
        for _ in 0..5 {
            assert!(controller.admit(&addressed, 600.0));
        }
        assert_eq!(controller.tokens(CLASS), Some(0.0));
        assert_eq!(controller.admitted_this_minute(CLASS), Some(0));
        assert!(controller.history().is_empty());
    }

    #[test]
    fn minute_boundary_flushes_counters() {
        let controller = AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0)).unwrap();
        assert!(controller.admit(&packet(1, 1), 10.0));
        assert!(controller.admit(&packet(1, 1), 30.0));
        assert!(controller.admit(&packet(1, 1), 59.0));
        assert!(controller.history().is_empty());

        assert!(controller.admit(&packet(1, 1), 61.0));
        assert_eq!(
            controller.history(),
            vec![HistoryRecord {
                minute_index: 1,
                device_id: 1,
                service_chain_id: 1,
                user_level: 1,
                admitted_count: 3,
            }]
        );
        assert_eq!(controller.admitted_this_minute(CLASS), Some(1));
    }

    #[test]
    fn flush_records_every_counter_in_key_order() {
        let snapshot = ControllerSnapshot {
            device_id: 3,
            tokens: vec![
                ClassValue::new(TrafficClassKey::new(2, 1), 5.0),
                ClassValue::new(CLASS, 10.0),
            ],
            capacities: vec![
                ClassValue::new(TrafficClassKey::new(2, 1), 5.0),
                ClassValue::new(CLASS, 10.0),
            ],
            refill_rates: vec![
                ClassValue::new(TrafficClassKey::new(2, 1), 1.0),
                ClassValue::new(CLASS, 1.0),
            ],
        };
        let controller = AdmissionController::from_snapshot(&snapshot).unwrap();
        controller.admit(&packet(2, 1), 5.0);
        controller.admit(&packet(2, 1), 6.0);
        controller.admit(&packet(1, 1), 130.0);

        let history = controller.history();
        let flushed: Vec<(i64, i64, u64)> = history
            .iter()
            .map(|record| (record.minute_index, record.service_chain_id, record.admitted_count))
            .collect();
        assert_eq!(flushed, vec![(2, 1, 0), (2, 2, 2)]);
        assert!(history.iter().all(|record| record.device_id == 3));
    }

    #[test]
    fn unconfigured_class_fails_open_without_new_counter() {
        let controller = AdmissionController::from_snapshot(&single_class(0.0, 10.0, 1.0)).unwrap();
        let unknown = TrafficClassKey::new(7, 2);
        for _ in 0..20 {
            assert!(controller.admit(&packet(7, 2), 0.0));
        }
        assert_eq!(controller.tokens(unknown), None);
        assert_eq!(controller.admitted_this_minute(unknown), None);

        controller.admit(&packet(1, 1), 61.0);
        assert!(controller
            .history()
            .iter()
            .all(|record| record.service_chain_id == 1));
    }

    #[test]
    fn class_with_capacity_but_no_tokens_is_counted() {
        let snapshot = ControllerSnapshot {
            device_id: 1,
            tokens: Vec::new(),
            capacities: vec![ClassValue::new(CLASS, 10.0)],
            refill_rates: vec![ClassValue::new(CLASS, 1.0)],
        };
        let controller = AdmissionController::from_snapshot(&snapshot).unwrap();
        assert!(controller.admit(&packet(1, 1), 0.0));
        assert!(controller.admit(&packet(1, 1), 1.0));
        assert_eq!(controller.admitted_this_minute(CLASS), Some(2));
    }

    #[test]
    fn fail_closed_policy_denies_unconfigured_class() {
        let controller = AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0))
            .unwrap()
            .with_policy(UnconfiguredPolicy::FailClosed);
        assert!(!controller.admit(&packet(9, 9), 0.0));
        assert!(controller.admit(&packet(1, 1), 0.0));
    }

    #[test]
    fn denial_does_not_count() {
        let controller = AdmissionController::from_snapshot(&single_class(1.0, 1.0, 0.0)).unwrap();
        assert!(controller.admit(&packet(1, 1), 0.0));
        assert!(!controller.admit(&packet(1, 1), 1.0));
        assert!(!controller.admit(&packet(1, 1), 2.0));
        assert_eq!(controller.admitted_this_minute(CLASS), Some(1));
    }

    #[test]
    fn missing_refill_rate_leaves_tokens_unchanged() {
        let snapshot = ControllerSnapshot {
            device_id: 1,
            tokens: vec![ClassValue::new(CLASS, 2.0)],
            capacities: vec![ClassValue::new(CLASS, 10.0)],
            refill_rates: Vec::new(),
        };
        let controller = AdmissionController::from_snapshot(&snapshot).unwrap();
        assert!(controller.admit(&packet(1, 1), 0.0));
        assert!(controller.admit(&packet(1, 1), 600.0));
        assert!(!controller.admit(&packet(1, 1), 1200.0));
        assert_eq!(controller.tokens(CLASS), Some(0.0));
    }

    #[test]
    fn backward_time_refills_again_when_clock_moves_forward() {
        let controller = AdmissionController::from_snapshot(&single_class(5.0, 10.0, 1.0)).unwrap();
        controller.admit(&packet(1, 1), 120.0);
        assert_eq!(controller.tokens(CLASS), Some(6.0));
        controller.admit(&packet(1, 1), 0.0);
        assert_eq!(controller.tokens(CLASS), Some(5.0));
        controller.admit(&packet(1, 1), 120.0);
        assert_eq!(controller.tokens(CLASS), Some(6.0));

        let minutes: Vec<i64> = controller
            .history()
            .iter()
            .map(|record| record.minute_index)
            .collect();
        assert_eq!(minutes, vec![2, 0, 2]);
    }

    #[test]
    fn tokens_stay_within_bounds() {
        let controller = AdmissionController::from_snapshot(&single_class(3.0, 4.0, 2.5)).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let mut time = 0.0;
        for _ in 0..2_000 {
            time += rng.gen_range(-30.0..90.0);
            let time = f64::max(time, 0.0);
            controller.admit(&packet(1, 1), time);
            let tokens = controller.tokens(CLASS).unwrap();
            assert!((0.0..=4.0).contains(&tokens), "tokens out of range: {}", tokens);
        }
    }

    #[test]
    fn concurrent_admits_never_oversubscribe() {
        let controller =
            Arc::new(AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0)).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    (0..10)
                        .filter(|_| controller.admit(&packet(1, 1), 0.0))
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
        assert_eq!(controller.admitted_this_minute(CLASS), Some(10));
    }

    #[test]
    fn fork_copies_tables_but_not_activity() {
        let controller = AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0))
            .unwrap()
            .with_policy(UnconfiguredPolicy::FailClosed);
        controller.admit(&packet(1, 1), 0.0);
        controller.admit(&packet(1, 1), 61.0);

        let forked = controller.fork();
        assert_eq!(forked.policy(), UnconfiguredPolicy::FailClosed);
        assert_eq!(forked.snapshot(), controller.snapshot());
        assert!(forked.history().is_empty());
        assert_eq!(forked.admitted_this_minute(CLASS), Some(0));
    }

    #[test]
    fn snapshot_round_trips_tables() {
        let snapshot = ControllerSnapshot::default();
        let controller = AdmissionController::from_snapshot(&snapshot).unwrap();
        assert_eq!(controller.snapshot(), snapshot);

        let restored = AdmissionController::from_snapshot(&controller.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn snapshot_survives_json_encoding() {
        let controller = AdmissionController::default();
        let encoded = serde_json::to_string(&controller.snapshot()).unwrap();
        let decoded: ControllerSnapshot = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, controller.snapshot());
    }

    #[test]
    fn restore_returns_previous_history_and_resets() {
        let controller = AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0)).unwrap();
        controller.admit(&packet(1, 1), 0.0);
        controller.admit(&packet(1, 1), 61.0);

        let previous = controller.restore(&single_class(2.0, 5.0, 3.0)).unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].admitted_count, 1);
        assert!(controller.history().is_empty());
        assert_eq!(controller.tokens(CLASS), Some(2.0));
        assert_eq!(controller.admitted_this_minute(CLASS), Some(0));
    }

    #[test]
    fn invalid_restore_keeps_existing_state() {
        let controller = AdmissionController::from_snapshot(&single_class(10.0, 10.0, 1.0)).unwrap();
        controller.admit(&packet(1, 1), 0.0);

        let mut bad = single_class(1.0, 1.0, 1.0);
        bad.tokens.push(ClassValue::new(CLASS, 1.0));
        let err = controller.restore(&bad).unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate tokens entry for traffic class (1, 1)"
        );
        assert_eq!(controller.tokens(CLASS), Some(9.0));
        assert_eq!(controller.admitted_this_minute(CLASS), Some(1));
    }

    #[test]
    fn snapshot_validation_rejects_bad_values() {
        assert!(AdmissionController::from_snapshot(&single_class(-1.0, 10.0, 1.0)).is_err());
        assert!(AdmissionController::from_snapshot(&single_class(1.0, f64::NAN, 1.0)).is_err());
        let err = AdmissionController::from_snapshot(&single_class(11.0, 10.0, 1.0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tokens for traffic class (1, 1) exceed capacity (11 > 10)"
        );
    }
}
