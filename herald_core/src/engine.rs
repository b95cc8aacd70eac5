//! Sans-IO broadcast engine.
//!
//! The engine owns the store and every transition function. It never
//! sleeps and never spawns: each operation takes the current time and
//! returns the one-shot timers the caller must arm. When a timer fires the
//! caller feeds its [`EngineEvent`] back through [`BroadcastEngine::handle`],
//! which re-reads the broadcast from the store before touching it.
//!
//! ```text
//! create ──► Draft ──► Scheduled ··(SchedulingLoop)··► Dispatch
//!              │                                          │
//!              └──────────────► Sending ◄─────────────────┘
//!                                  │ CompleteDelivery (after completion_delay)
//!                                  ▼
//!                              Completed ──► DripTick × max_updates
//! ```

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audience::AudienceResolver;
use crate::config::EngineConfig;
use crate::delivery::{DeliverySimulator, SendOutcome};
use crate::drip::{DripOutcome, DripUpdater};
use crate::error::{BroadcastError, ValidationError};
use crate::model::{
    Broadcast, BroadcastId, BroadcastStatus, BroadcastUpdate, CreateBroadcast, Schedule,
};
use crate::store::{BroadcastFilter, BroadcastStore, StoreSnapshot, StoreSummary};

/// Something that happens to one broadcast when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    /// `Scheduled → Sending`, emitted by the scheduling loop
    Dispatch(BroadcastId),

    /// `Sending → Completed`
    CompleteDelivery(BroadcastId),

    /// One opened-count increment
    DripTick(BroadcastId),
}

impl EngineEvent {
    pub fn broadcast_id(&self) -> BroadcastId {
        match self {
            EngineEvent::Dispatch(id) | EngineEvent::CompleteDelivery(id) | EngineEvent::DripTick(id) => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Dispatch(_) => "dispatch",
            EngineEvent::CompleteDelivery(_) => "complete_delivery",
            EngineEvent::DripTick(_) => "drip_tick",
        }
    }
}

/// A one-shot timer the caller must arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub delay: Duration,
    pub event: EngineEvent,
}

impl TimerRequest {
    pub fn after(delay: Duration, event: EngineEvent) -> Self {
        Self { delay, event }
    }
}

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub created: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub drip_updates: u64,
    /// Events that arrived after their broadcast had moved on
    pub stale_events: u64,
}

/// The broadcast engine.
pub struct BroadcastEngine<R: AudienceResolver> {
    config: EngineConfig,
    resolver: R,
    store: BroadcastStore,
    delivery: DeliverySimulator,
    drip: DripUpdater,
    rng: StdRng,
    updates: Vec<BroadcastUpdate>,
    stats: EngineStats,
}

impl<R: AudienceResolver> BroadcastEngine<R> {
    /// Creates an engine with an empty store.
    ///
    /// `rng` drives broadcast ids and drip increments; pass a seeded one for
    /// reproducible runs.
    pub fn new(config: EngineConfig, resolver: R, rng: StdRng) -> Self {
        Self::with_store(config, resolver, rng, BroadcastStore::new())
    }

    /// Creates an engine over an existing store (e.g. restored from a snapshot).
    pub fn with_store(config: EngineConfig, resolver: R, rng: StdRng, store: BroadcastStore) -> Self {
        let delivery = DeliverySimulator::new(&config);
        let drip = DripUpdater::new(config.drip.clone());
        Self {
            config,
            resolver,
            store,
            delivery,
            drip,
            rng,
            updates: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &BroadcastStore {
        &self.store
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn get(&self, id: &BroadcastId) -> Option<&Broadcast> {
        self.store.get(id)
    }

    pub fn list(&self, filter: &BroadcastFilter) -> Vec<Broadcast> {
        self.store.list(filter)
    }

    pub fn summary(&self) -> StoreSummary {
        self.store.summary()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Number of broadcasts whose opened count is still growing.
    pub fn active_drips(&self) -> usize {
        self.drip.active()
    }

    /// Takes the change notifications accumulated since the last call.
    pub fn drain_updates(&mut self) -> Vec<BroadcastUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Validates, resolves the audience once, and stores a new broadcast.
    ///
    /// Invalid requests are rejected and nothing is stored. An audience that
    /// fails to resolve is recorded on the broadcast and fails it when it
    /// enters `Sending`.
    pub fn create_broadcast(
        &mut self,
        request: CreateBroadcast,
        now: DateTime<Utc>,
    ) -> Result<(Broadcast, Vec<TimerRequest>), BroadcastError> {
        validate(&request)?;

        let (audience_count, resolution_error) = match self.resolver.resolve(&request.target) {
            Ok(count) => (count, None),
            Err(err) => {
                warn!(selector = request.target.mode(), error = %err, "audience resolution failed");
                (0, Some(err.to_string()))
            }
        };

        let id = BroadcastId(uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid());
        let broadcast = Broadcast {
            id,
            title: request.title.trim().to_string(),
            target: request.target,
            audience_count,
            content: request.content,
            schedule: request.schedule,
            status: BroadcastStatus::Draft,
            delivered_count: 0,
            opened_count: 0,
            created_at: now,
            sent_at: None,
            resolution_error,
            failure_reason: None,
        };
        self.store.insert(broadcast);
        self.stats.created += 1;
        info!(%id, audience = audience_count, draft = request.save_as_draft, "broadcast created");

        let timers = if request.save_as_draft {
            self.notify(&id);
            Vec::new()
        } else {
            self.submit(&id)?
        };
        Ok((self.cloned(&id)?, timers))
    }

    /// Submits a stored draft: `Draft → Sending` or `Draft → Scheduled`.
    pub fn submit_draft(&mut self, id: &BroadcastId) -> Result<(Broadcast, Vec<TimerRequest>), BroadcastError> {
        let timers = self.submit(id)?;
        Ok((self.cloned(id)?, timers))
    }

    /// Processes one fired timer.
    ///
    /// Events for broadcasts that have already moved past the step they
    /// target are dropped; `status` is the durable record of what happened.
    pub fn handle(&mut self, event: EngineEvent, now: DateTime<Utc>) -> Result<Vec<TimerRequest>, BroadcastError> {
        let id = event.broadcast_id();
        let status = self.store.get(&id).ok_or(BroadcastError::NotFound(id))?.status;

        let expected = match event {
            EngineEvent::Dispatch(_) => BroadcastStatus::Scheduled,
            EngineEvent::CompleteDelivery(_) => BroadcastStatus::Sending,
            EngineEvent::DripTick(_) => BroadcastStatus::Completed,
        };
        if status != expected {
            self.stats.stale_events += 1;
            debug!(%id, event = event.name(), %status, "stale event ignored");
            return Ok(Vec::new());
        }

        match event {
            EngineEvent::Dispatch(_) => {
                self.stats.dispatched += 1;
                info!(%id, "dispatching scheduled broadcast");
                self.begin_sending(&id)
            }
            EngineEvent::CompleteDelivery(_) => self.complete_delivery(&id, now),
            EngineEvent::DripTick(_) => self.drip_tick(&id),
        }
    }

    /// Timers that must be re-armed after restoring from a snapshot.
    ///
    /// `Sending` broadcasts get a fresh completion timer. Drip growth is
    /// volatile and is not resumed for broadcasts that were already completed.
    pub fn resume(&self) -> Vec<TimerRequest> {
        self.store
            .iter()
            .filter(|b| b.status == BroadcastStatus::Sending)
            .map(|b| TimerRequest::after(self.config.completion_delay(), EngineEvent::CompleteDelivery(b.id)))
            .collect()
    }

    fn submit(&mut self, id: &BroadcastId) -> Result<Vec<TimerRequest>, BroadcastError> {
        let broadcast = self.store.get_mut(id).ok_or(BroadcastError::NotFound(*id))?;
        let schedule = broadcast.schedule;
        match schedule {
            Schedule::Immediate => self.begin_sending(id),
            Schedule::At(due) => {
                broadcast.transition(BroadcastStatus::Scheduled)?;
                info!(%id, due = %due, "broadcast scheduled");
                self.notify(id);
                Ok(Vec::new())
            }
        }
    }

    fn begin_sending(&mut self, id: &BroadcastId) -> Result<Vec<TimerRequest>, BroadcastError> {
        let broadcast = self.store.get_mut(id).ok_or(BroadcastError::NotFound(*id))?;
        let outcome = self.delivery.begin_sending(broadcast)?;
        let timers = match outcome {
            SendOutcome::Sending { complete_after } => {
                info!(%id, audience = broadcast.audience_count, "broadcast sending");
                vec![TimerRequest::after(complete_after, EngineEvent::CompleteDelivery(*id))]
            }
            SendOutcome::Failed => {
                self.stats.failed += 1;
                warn!(
                    %id,
                    reason = broadcast.failure_reason.as_deref().unwrap_or("unknown"),
                    "broadcast failed"
                );
                Vec::new()
            }
        };
        self.notify(id);
        Ok(timers)
    }

    fn complete_delivery(&mut self, id: &BroadcastId, now: DateTime<Utc>) -> Result<Vec<TimerRequest>, BroadcastError> {
        let broadcast = self.store.get_mut(id).ok_or(BroadcastError::NotFound(*id))?;
        self.delivery.complete(broadcast, now)?;
        self.stats.completed += 1;
        info!(
            %id,
            delivered = broadcast.delivered_count,
            opened = broadcast.opened_count,
            "broadcast completed"
        );

        let timers = self
            .drip
            .start(broadcast)
            .map(|delay| TimerRequest::after(delay, EngineEvent::DripTick(*id)))
            .into_iter()
            .collect();
        self.notify(id);
        Ok(timers)
    }

    fn drip_tick(&mut self, id: &BroadcastId) -> Result<Vec<TimerRequest>, BroadcastError> {
        let broadcast = self.store.get_mut(id).ok_or(BroadcastError::NotFound(*id))?;
        let before = broadcast.opened_count;
        let outcome = self.drip.tick(broadcast, &mut self.rng);
        let after = broadcast.opened_count;
        self.stats.drip_updates += 1;

        if after != before {
            debug!(%id, opened = after, "opened count updated");
            self.notify(id);
        }
        Ok(match outcome {
            DripOutcome::Continue => vec![TimerRequest::after(self.config.drip.interval(), EngineEvent::DripTick(*id))],
            DripOutcome::Finished => {
                debug!(%id, opened = after, "drip finished");
                Vec::new()
            }
        })
    }

    fn notify(&mut self, id: &BroadcastId) {
        if let Some(b) = self.store.get(id) {
            self.updates.push(BroadcastUpdate::from(b));
        }
    }

    fn cloned(&self, id: &BroadcastId) -> Result<Broadcast, BroadcastError> {
        self.store.get(id).cloned().ok_or(BroadcastError::NotFound(*id))
    }
}

fn validate(request: &CreateBroadcast) -> Result<(), ValidationError> {
    if request.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if request.content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if request.target.is_empty_selection() {
        return Err(ValidationError::EmptySelection(request.target.mode()));
    }
    Ok(())
}
