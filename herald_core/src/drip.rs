//! Metric drip updater.
//!
//! After completion the opened count grows in small random steps: each
//! step adds something in `[0, audience × increment%)`, the result is
//! clamped to `audience × ceiling%`, and updates stop once the ceiling is
//! hit or the per-broadcast budget runs out.

use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{percent_of, DripConfig};
use crate::model::{Broadcast, BroadcastId, BroadcastStatus};

/// Whether another drip tick should be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DripOutcome {
    Continue,
    Finished,
}

#[derive(Debug, Clone)]
pub struct DripUpdater {
    config: DripConfig,
    /// Updates left per broadcast; absent once finished
    remaining: HashMap<BroadcastId, u32>,
}

impl DripUpdater {
    pub fn new(config: DripConfig) -> Self {
        Self {
            config,
            remaining: HashMap::new(),
        }
    }

    /// Opened-count ceiling for a broadcast.
    pub fn ceiling(&self, broadcast: &Broadcast) -> u64 {
        percent_of(broadcast.audience_count, self.config.ceiling_percent).min(broadcast.delivered_count)
    }

    /// Registers a freshly completed broadcast. Returns the delay of the
    /// first tick, or `None` when there is nothing to grow.
    pub fn start(&mut self, broadcast: &Broadcast) -> Option<Duration> {
        if broadcast.status != BroadcastStatus::Completed
            || self.config.max_updates == 0
            || broadcast.opened_count >= self.ceiling(broadcast)
        {
            return None;
        }
        self.remaining.insert(broadcast.id, self.config.max_updates);
        Some(self.config.interval())
    }

    /// Applies one increment.
    pub fn tick<G: Rng>(&mut self, broadcast: &mut Broadcast, rng: &mut G) -> DripOutcome {
        if broadcast.status != BroadcastStatus::Completed {
            self.remaining.remove(&broadcast.id);
            return DripOutcome::Finished;
        }
        let ceiling = self.ceiling(broadcast);
        let Some(remaining) = self.remaining.get_mut(&broadcast.id) else {
            return DripOutcome::Finished;
        };

        let bound = percent_of(broadcast.audience_count, self.config.increment_percent);
        let increment = if bound > 0 { rng.gen_range(0..bound) } else { 0 };
        broadcast.opened_count = broadcast
            .opened_count
            .saturating_add(increment)
            .min(ceiling)
            .max(broadcast.opened_count);

        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 || broadcast.opened_count >= ceiling {
            self.remaining.remove(&broadcast.id);
            DripOutcome::Finished
        } else {
            DripOutcome::Continue
        }
    }

    /// Number of broadcasts still growing.
    pub fn active(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_active(&self, id: &BroadcastId) -> bool {
        self.remaining.contains_key(id)
    }
}
