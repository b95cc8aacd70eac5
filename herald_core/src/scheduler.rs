//! Scheduling loop and dispatch guard.
//!
//! The loop re-scans the whole store on every tick, so a due broadcast is
//! *observed* many times. Two things keep it from being *dispatched* more
//! than once:
//!
//! 1. The durable marker: only `Scheduled` broadcasts are ever due, and the
//!    engine refuses to dispatch anything that has left `Scheduled`. This
//!    survives restarts.
//! 2. The [`DispatchGuard`]: a claim set owned by one loop instance. An id
//!    is claimed before any work for it starts, so a tick that runs before
//!    the previous dispatch's status write is visible is a no-op.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

use crate::engine::EngineEvent;
use crate::model::BroadcastId;
use crate::store::BroadcastStore;

/// Per-loop claim set. Ids are added once and never removed.
#[derive(Debug, Default)]
pub struct DispatchGuard {
    claimed: Mutex<HashSet<BroadcastId>>,
}

impl DispatchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id`. Exactly one caller gets `true`; every later call gets `false`.
    pub fn claim(&self, id: BroadcastId) -> bool {
        let mut claimed = match self.claimed.lock() {
            Ok(guard) => guard,
            // A panic while holding the lock cannot leave the set half-written.
            Err(poisoned) => poisoned.into_inner(),
        };
        claimed.insert(id)
    }

    pub fn is_claimed(&self, id: &BroadcastId) -> bool {
        match self.claimed.lock() {
            Ok(guard) => guard.contains(id),
            Err(poisoned) => poisoned.into_inner().contains(id),
        }
    }

    pub fn claimed_count(&self) -> usize {
        match self.claimed.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Counters kept by one loop instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks executed
    pub ticks: u64,

    /// Due broadcasts seen across all ticks (including repeats)
    pub observed: u64,

    /// Dispatch events emitted
    pub dispatched: u64,
}

/// Scan-and-dispatch loop state.
///
/// Built when the loop starts and dropped when it stops; a restarted loop
/// begins with an empty guard and relies on the durable status alone.
#[derive(Debug, Default)]
pub struct SchedulingLoop {
    guard: DispatchGuard,
    stats: LoopStats,
}

impl SchedulingLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// One tick: claim every due broadcast and emit a `Dispatch` per new claim.
    pub fn tick(&mut self, store: &BroadcastStore, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let due = store.due_scheduled(now);
        self.claim_due(&due)
    }

    /// Same as [`tick`](Self::tick) for callers that fetched the due ids themselves.
    pub fn claim_due(&mut self, due: &[BroadcastId]) -> Vec<EngineEvent> {
        self.stats.ticks += 1;
        self.stats.observed += due.len() as u64;

        let events: Vec<EngineEvent> = due
            .iter()
            .filter(|id| self.guard.claim(**id))
            .map(|id| EngineEvent::Dispatch(*id))
            .collect();

        self.stats.dispatched += events.len() as u64;
        if !due.is_empty() {
            debug!(
                tick = self.stats.ticks,
                due = due.len(),
                dispatched = events.len(),
                "scheduling tick"
            );
        }
        events
    }

    pub fn guard(&self) -> &DispatchGuard {
        &self.guard
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }
}
