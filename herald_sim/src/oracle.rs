//! Invariant oracle for simulation.
//!
//! The Oracle watches the store after every simulated event and records
//! anything that should never happen:
//! - counters out of order (`opened ≤ delivered ≤ audience`)
//! - a status moving backwards or sideways
//! - the opened count decreasing
//! - `sent_at` or the delivered count changing after completion
//! - a broadcast dispatched or completed more than once

use chrono::{DateTime, Utc};
use herald_core::{Broadcast, BroadcastId, BroadcastStatus, BroadcastStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One recorded invariant violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Simulation time in seconds
    pub time_sec: f64,
    pub broadcast: String,
    pub message: String,
}

/// Last observed state of one broadcast.
#[derive(Debug, Clone)]
struct Observed {
    status: BroadcastStatus,
    delivered: u64,
    opened: u64,
    sent_at: Option<DateTime<Utc>>,
}

impl From<&Broadcast> for Observed {
    fn from(b: &Broadcast) -> Self {
        Self {
            status: b.status,
            delivered: b.delivered_count,
            opened: b.opened_count,
            sent_at: b.sent_at,
        }
    }
}

/// The Oracle - ground-truth checker for broadcast invariants.
#[derive(Debug, Default)]
pub struct InvariantOracle {
    last: HashMap<BroadcastId, Observed>,
    dispatches: HashMap<BroadcastId, u32>,
    completions: HashMap<BroadcastId, u32>,
    violations: Vec<Violation>,
    observations: u64,
}

impl InvariantOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every broadcast in the store against its previous observation.
    pub fn observe(&mut self, time_sec: f64, store: &BroadcastStore) {
        self.observations += 1;

        for b in store.iter() {
            if !b.counters_consistent() {
                self.violate(
                    time_sec,
                    b.id,
                    format!(
                        "counters out of order: opened={} delivered={} audience={}",
                        b.opened_count, b.delivered_count, b.audience_count
                    ),
                );
            }

            if let Some(prev) = self.last.get(&b.id).cloned() {
                self.compare(time_sec, &prev, b);
            }
            self.last.insert(b.id, Observed::from(b));
        }
    }

    fn compare(&mut self, time_sec: f64, prev: &Observed, b: &Broadcast) {
        if prev.status != b.status && !prev.status.can_transition_to(b.status) {
            // Two legal steps between observations are fine as long as we moved forward
            let forward = b.status.rank() > prev.status.rank() && !prev.status.is_terminal();
            if !forward {
                self.violate(time_sec, b.id, format!("status went {} -> {}", prev.status, b.status));
            }
        }
        if b.opened_count < prev.opened {
            self.violate(
                time_sec,
                b.id,
                format!("opened count decreased {} -> {}", prev.opened, b.opened_count),
            );
        }
        if prev.sent_at.is_some() && b.sent_at != prev.sent_at {
            self.violate(time_sec, b.id, "sent_at changed after being set".to_string());
        }
        if prev.status == BroadcastStatus::Completed && b.delivered_count != prev.delivered {
            self.violate(time_sec, b.id, "delivered count changed after completion".to_string());
        }
    }

    /// Records a dispatch emitted by the scheduling loop.
    pub fn record_dispatch(&mut self, time_sec: f64, id: BroadcastId) {
        let count = self.dispatches.entry(id).or_insert(0);
        *count += 1;
        if *count > 1 {
            let n = *count;
            self.violate(time_sec, id, format!("dispatched {} times", n));
        }
    }

    /// Records a `Sending → Completed` transition.
    pub fn record_completion(&mut self, time_sec: f64, id: BroadcastId) {
        let count = self.completions.entry(id).or_insert(0);
        *count += 1;
        if *count > 1 {
            let n = *count;
            self.violate(time_sec, id, format!("completed {} times", n));
        }
    }

    pub fn dispatch_count(&self, id: &BroadcastId) -> u32 {
        self.dispatches.get(id).copied().unwrap_or(0)
    }

    pub fn completion_count(&self, id: &BroadcastId) -> u32 {
        self.completions.get(id).copied().unwrap_or(0)
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    fn violate(&mut self, time_sec: f64, id: BroadcastId, message: String) {
        tracing::error!(broadcast = %id, t = time_sec, "invariant violated: {}", message);
        self.violations.push(Violation {
            time_sec,
            broadcast: id.to_string(),
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_dispatch_is_a_violation() {
        let mut oracle = InvariantOracle::new();
        let id = BroadcastId::from_seed(1);

        oracle.record_dispatch(1.0, id);
        assert!(oracle.is_clean());

        oracle.record_dispatch(2.0, id);
        assert_eq!(oracle.violations().len(), 1);
        assert_eq!(oracle.dispatch_count(&id), 2);
    }

    #[test]
    fn test_double_completion_is_a_violation() {
        let mut oracle = InvariantOracle::new();
        let id = BroadcastId::from_seed(2);

        oracle.record_completion(1.0, id);
        oracle.record_completion(1.0, id);
        assert!(!oracle.is_clean());
        assert!(oracle.violations()[0].message.contains("completed 2 times"));
    }

    fn snapshot_with(status: BroadcastStatus, delivered: u64, opened: u64) -> BroadcastStore {
        let b = Broadcast {
            id: BroadcastId::from_seed(9),
            title: "t".into(),
            target: herald_core::TargetSelector::All,
            audience_count: 1000,
            content: herald_core::MessageContent::text("m"),
            schedule: herald_core::Schedule::Immediate,
            status,
            delivered_count: delivered,
            opened_count: opened,
            created_at: Utc::now(),
            sent_at: None,
            resolution_error: None,
            failure_reason: None,
        };
        BroadcastStore::from_snapshot(herald_core::StoreSnapshot { broadcasts: vec![b] })
    }

    #[test]
    fn test_decreasing_opened_count_is_caught() {
        let mut oracle = InvariantOracle::new();
        oracle.observe(1.0, &snapshot_with(BroadcastStatus::Completed, 1000, 700));
        oracle.observe(2.0, &snapshot_with(BroadcastStatus::Completed, 1000, 650));

        assert_eq!(oracle.violations().len(), 1);
        assert!(oracle.violations()[0].message.contains("decreased"));
    }

    #[test]
    fn test_backwards_status_is_caught() {
        let mut oracle = InvariantOracle::new();
        oracle.observe(1.0, &snapshot_with(BroadcastStatus::Sending, 0, 0));
        oracle.observe(2.0, &snapshot_with(BroadcastStatus::Scheduled, 0, 0));

        assert!(!oracle.is_clean());
    }

    #[test]
    fn test_inconsistent_counters_are_caught() {
        let mut oracle = InvariantOracle::new();
        oracle.observe(1.0, &snapshot_with(BroadcastStatus::Completed, 100, 200));
        assert!(oracle.violations()[0].message.contains("counters out of order"));
    }

    #[test]
    fn test_forward_progress_is_clean() {
        let mut oracle = InvariantOracle::new();
        oracle.observe(0.0, &snapshot_with(BroadcastStatus::Scheduled, 0, 0));
        // Scheduled -> Completed between two observations is two legal steps
        oracle.observe(3.0, &snapshot_with(BroadcastStatus::Completed, 1000, 600));
        oracle.observe(7.0, &snapshot_with(BroadcastStatus::Completed, 1000, 612));
        assert!(oracle.is_clean());
    }

    #[test]
    fn test_empty_store_is_clean() {
        let mut oracle = InvariantOracle::new();
        oracle.observe(0.0, &BroadcastStore::new());
        assert!(oracle.is_clean());
        assert_eq!(oracle.observations(), 1);
    }
}
