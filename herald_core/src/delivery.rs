//! Delivery simulator: the two-phase `Sending → Completed` send.
//!
//! No message leaves the process. Entering `Sending` arms a one-shot
//! completion timer; when it fires the broadcast is marked delivered to its
//! whole audience and the opened count is seeded.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::{percent_of, EngineConfig};
use crate::error::BroadcastError;
use crate::model::{Broadcast, BroadcastStatus};

/// Result of entering `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Completion timer must be armed with this delay
    Sending { complete_after: Duration },

    /// Audience was unusable; the broadcast went straight to `Failed`
    Failed,
}

#[derive(Debug, Clone)]
pub struct DeliverySimulator {
    completion_delay: Duration,
    seed_open_percent: u32,
}

impl DeliverySimulator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            completion_delay: config.completion_delay(),
            seed_open_percent: config.seed_open_percent,
        }
    }

    /// Moves a `Draft`/`Scheduled` broadcast into `Sending`.
    ///
    /// A broadcast whose audience failed to resolve, or resolved to nobody,
    /// continues to `Failed` with a reason and no counters.
    pub fn begin_sending(&self, broadcast: &mut Broadcast) -> Result<SendOutcome, BroadcastError> {
        broadcast.transition(BroadcastStatus::Sending)?;

        if let Some(reason) = unusable_audience(broadcast) {
            broadcast.transition(BroadcastStatus::Failed)?;
            broadcast.failure_reason = Some(reason);
            return Ok(SendOutcome::Failed);
        }

        Ok(SendOutcome::Sending {
            complete_after: self.completion_delay,
        })
    }

    /// `Sending → Completed`, using the audience count stored on the broadcast.
    pub fn complete(&self, broadcast: &mut Broadcast, now: DateTime<Utc>) -> Result<(), BroadcastError> {
        broadcast.transition(BroadcastStatus::Completed)?;

        broadcast.delivered_count = broadcast.audience_count;
        broadcast.opened_count = percent_of(broadcast.audience_count, self.seed_open_percent);
        broadcast.sent_at = Some(now);
        Ok(())
    }
}

fn unusable_audience(broadcast: &Broadcast) -> Option<String> {
    if let Some(err) = &broadcast.resolution_error {
        return Some(format!("audience resolution failed: {}", err));
    }
    if broadcast.audience_count == 0 {
        return Some("audience is empty".to_string());
    }
    None
}
