//! SimWorld - The simulation harness container.
//!
//! The world drives the sans-IO engine against a virtual clock. Timers the
//! engine asks for go into a priority queue keyed by virtual due time; the
//! scheduling loop ticks on its configured interval. Everything happens in
//! strict time order, so a run is fully determined by its seed.

use crate::context::SimContext;
use crate::oracle::InvariantOracle;

use chrono::{DateTime, Utc};
use herald_core::{
    AudienceConfig, Broadcast, BroadcastEngine, BroadcastError, BroadcastId, BroadcastStatus, BroadcastStore,
    ConfigError, CreateBroadcast, EngineConfig, EngineEvent, EngineStats, SchedulingLoop, StaticAudience, TimerRequest,
};
use herald_env::HeraldContext;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// RNG stream used by the engine (ids, drip increments).
const ENGINE_STREAM: u64 = 1;

/// Configuration for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Virtual time advanced per step, in milliseconds
    pub step_ms: u64,

    /// Maximum simulation duration in seconds
    pub max_duration_secs: f64,

    /// Engine parameters
    pub engine: EngineConfig,

    /// Audience table for the static resolver
    pub audience: AudienceConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        let audience = AudienceConfig {
            total_users: 5420,
            segments: [("A", 234), ("B", 1000), ("vip", 87)]
                .into_iter()
                .map(|(id, n)| (herald_core::SegmentId::new(id), n))
                .collect(),
        };
        Self {
            seed: 42,
            step_ms: 500,
            max_duration_secs: 120.0,
            engine: EngineConfig::default(),
            audience,
        }
    }
}

impl SimConfig {
    /// Loads a JSON config; missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the virtual clock cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_ms == 0 {
            return Err(ConfigError::Invalid("step_ms must be > 0".into()));
        }
        if Duration::try_from_secs_f64(self.max_duration_secs).is_err() {
            return Err(ConfigError::Invalid(format!(
                "max_duration_secs {} is not a valid duration",
                self.max_duration_secs
            )));
        }
        self.engine.validate()
    }

    /// `max_duration_secs` as a `Duration`; zero if it is not representable.
    pub fn max_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_duration_secs).unwrap_or(Duration::ZERO)
    }
}

/// A timer waiting in the virtual queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTimer {
    due: Duration,
    /// Arming order; breaks ties between timers due at the same instant
    seq: u64,
    event: EngineEvent,
}

impl Ord for PendingTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for PendingTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    engine: BroadcastEngine<StaticAudience>,

    scheduler: SchedulingLoop,

    timers: BinaryHeap<Reverse<PendingTimer>>,

    next_seq: u64,

    /// Virtual time of the next scheduling tick
    next_tick: Duration,

    oracle: InvariantOracle,

    /// Current step count
    step_count: u64,

    /// Store updates the engine has published so far
    updates_seen: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let context = SimContext::shared(config.seed);
        let engine = BroadcastEngine::new(
            config.engine.clone(),
            config.audience.build(),
            context.derive_rng(ENGINE_STREAM),
        );
        let next_tick = config.engine.tick_interval();

        Ok(Self {
            config,
            context,
            engine,
            scheduler: SchedulingLoop::new(),
            timers: BinaryHeap::new(),
            next_seq: 0,
            next_tick,
            oracle: InvariantOracle::new(),
            step_count: 0,
            updates_seen: 0,
        })
    }

    /// Current virtual wall-clock.
    pub fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.context.system_time())
    }

    /// Virtual wall-clock `offset` from now.
    pub fn now_plus(&self, offset: Duration) -> DateTime<Utc> {
        self.now() + chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::zero())
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Number of store updates published to subscribers so far.
    pub fn updates_seen(&self) -> u64 {
        self.updates_seen
    }

    pub fn engine(&self) -> &BroadcastEngine<StaticAudience> {
        &self.engine
    }

    pub fn store(&self) -> &BroadcastStore {
        self.engine.store()
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn oracle(&self) -> &InvariantOracle {
        &self.oracle
    }

    pub fn scheduler(&self) -> &SchedulingLoop {
        &self.scheduler
    }

    pub fn get(&self, id: &BroadcastId) -> Option<&Broadcast> {
        self.engine.get(id)
    }

    /// Timers still waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Operator action: create a broadcast at the current virtual time.
    pub fn create(&mut self, request: CreateBroadcast) -> Result<Broadcast, BroadcastError> {
        let (broadcast, timers) = self.engine.create_broadcast(request, self.now())?;
        self.arm(timers);
        self.observe();
        Ok(broadcast)
    }

    /// Operator action: submit a stored draft.
    pub fn submit_draft(&mut self, id: &BroadcastId) -> Result<Broadcast, BroadcastError> {
        let (broadcast, timers) = self.engine.submit_draft(id)?;
        self.arm(timers);
        self.observe();
        Ok(broadcast)
    }

    /// Advances virtual time by one step, processing everything due on the way.
    pub fn step(&mut self) {
        let target = self.context.now() + Duration::from_millis(self.config.step_ms);
        self.advance_to(target);
        self.updates_seen += self.engine.drain_updates().len() as u64;
        self.step_count += 1;
    }

    /// Steps until `duration` of virtual time has passed.
    pub fn run_for(&mut self, duration: Duration) {
        let end = self.context.now() + duration;
        while self.context.now() < end {
            self.step();
        }
    }

    /// Steps until no timers are pending and nothing is waiting to be
    /// dispatched, or `max_duration_secs` is reached. Returns true when idle.
    pub fn run_until_idle(&mut self) -> bool {
        let limit = self.config.max_duration();
        while self.context.now() < limit {
            if self.is_idle() {
                return true;
            }
            self.step();
        }
        self.is_idle()
    }

    /// Nothing in flight: no timers armed, nothing scheduled or sending.
    pub fn is_idle(&self) -> bool {
        self.timers.is_empty()
            && self
                .store()
                .iter()
                .all(|b| !matches!(b.status, BroadcastStatus::Scheduled | BroadcastStatus::Sending))
    }

    /// Runs `n` scheduling ticks back to back at the current instant, without
    /// processing any of the resulting dispatches in between. Returns how
    /// many dispatch events were emitted.
    pub fn tick_burst(&mut self, n: usize) -> usize {
        let now = self.now();
        let mut events = Vec::new();
        for _ in 0..n {
            events.extend(self.scheduler.tick(self.engine.store(), now));
        }
        let emitted = events.len();
        for event in events {
            self.oracle.record_dispatch(self.time(), event.broadcast_id());
            self.fire(event);
        }
        emitted
    }

    /// Replaces the scheduling loop with a fresh instance (empty guard), as
    /// after a process restart.
    pub fn restart_loop(&mut self) {
        debug!(claimed = self.scheduler.guard().claimed_count(), "restarting scheduling loop");
        self.scheduler = SchedulingLoop::new();
    }

    fn advance_to(&mut self, target: Duration) {
        loop {
            let next_timer = self.timers.peek().map(|Reverse(t)| t.due);
            let tick_due = self.next_tick <= target;
            let timer_due = next_timer.map_or(false, |due| due <= target);

            // Timers due at or before the tick instant run first
            let run_timer = match (timer_due, tick_due) {
                (false, false) => break,
                (true, false) => true,
                (false, true) => false,
                (true, true) => next_timer.map_or(false, |due| due <= self.next_tick),
            };

            if run_timer {
                if let Some(Reverse(timer)) = self.timers.pop() {
                    self.set_clock(timer.due);
                    self.fire(timer.event);
                }
            } else {
                self.set_clock(self.next_tick);
                self.scheduler_tick();
                self.next_tick += self.config.engine.tick_interval();
            }
        }
        self.set_clock(target);
    }

    fn scheduler_tick(&mut self) {
        let events = self.scheduler.tick(self.engine.store(), self.now());
        for event in events {
            self.oracle.record_dispatch(self.time(), event.broadcast_id());
            self.fire(event);
        }
    }

    fn fire(&mut self, event: EngineEvent) {
        let id = event.broadcast_id();
        let before = self.engine.get(&id).map(|b| b.status);

        match self.engine.handle(event, self.now()) {
            Ok(timers) => self.arm(timers),
            Err(err) => warn!(%id, event = event.name(), error = %err, "event failed"),
        }

        let after = self.engine.get(&id).map(|b| b.status);
        if before == Some(BroadcastStatus::Sending) && after == Some(BroadcastStatus::Completed) {
            self.oracle.record_completion(self.time(), id);
        }
        self.observe();
    }

    fn arm(&mut self, timers: Vec<TimerRequest>) {
        let now = self.context.now();
        for timer in timers {
            self.timers.push(Reverse(PendingTimer {
                due: now + timer.delay,
                seq: self.next_seq,
                event: timer.event,
            }));
            self.next_seq += 1;
        }
    }

    fn observe(&mut self) {
        let time = self.time();
        self.oracle.observe(time, self.engine.store());
    }

    fn set_clock(&self, at: Duration) {
        self.context.set_time(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{MessageContent, Schedule, TargetSelector};

    fn request(target: TargetSelector, schedule: Schedule) -> CreateBroadcast {
        CreateBroadcast::new("Promo", target, MessageContent::text("hi"), schedule)
    }

    #[test]
    fn test_sim_world_step_advances_time() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();

        assert_eq!(world.step_count(), 0);
        assert_eq!(world.time(), 0.0);

        world.step();

        assert_eq!(world.step_count(), 1);
        assert!((world.time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_immediate_broadcast_completes_at_two_seconds() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        let b = world.create(request(TargetSelector::All, Schedule::Immediate)).unwrap();

        world.run_for(Duration::from_millis(1500));
        assert_eq!(world.get(&b.id).unwrap().status, BroadcastStatus::Sending);

        world.run_for(Duration::from_millis(500));
        let done = world.get(&b.id).unwrap();
        assert_eq!(done.status, BroadcastStatus::Completed);
        assert_eq!(done.opened_count, 3252);
        assert_eq!(done.sent_at, Some(world.now()));
    }

    #[test]
    fn test_scheduled_broadcast_waits_for_tick() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        // Due at 5s; the first tick is at 15s
        let due = world.now_plus(Duration::from_secs(5));
        let b = world.create(request(TargetSelector::segments(["A"]), Schedule::At(due))).unwrap();

        world.run_for(Duration::from_secs(14));
        assert_eq!(world.get(&b.id).unwrap().status, BroadcastStatus::Scheduled);

        world.run_for(Duration::from_secs(1));
        assert_eq!(world.get(&b.id).unwrap().status, BroadcastStatus::Sending);

        world.run_for(Duration::from_secs(2));
        let done = world.get(&b.id).unwrap();
        assert_eq!(done.status, BroadcastStatus::Completed);
        assert_eq!(done.delivered_count, 234);
    }

    #[test]
    fn test_run_until_idle_drains_drip() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.create(request(TargetSelector::All, Schedule::Immediate)).unwrap();

        assert!(world.run_until_idle());
        assert_eq!(world.pending_timers(), 0);
        assert!(world.oracle().is_clean());
    }

    #[test]
    fn test_sim_world_determinism() {
        let run = || {
            let mut world = SimWorld::new(SimConfig::default()).unwrap();
            let b = world.create(request(TargetSelector::All, Schedule::Immediate)).unwrap();
            world.run_until_idle();
            let done = world.get(&b.id).unwrap().clone();
            (done.id, done.opened_count)
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_config_json_overrides() {
        let config: SimConfig = serde_json::from_str(r#"{ "seed": 7, "engine": { "tick_interval_ms": 1000 } }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.engine.tick_interval_ms, 1000);
        assert_eq!(config.step_ms, 500);
        assert_eq!(config.audience.total_users, 5420);
    }

    #[test]
    fn test_zero_step_rejected() {
        let config: SimConfig = serde_json::from_str(r#"{ "step_ms": 0 }"#).unwrap();

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(SimWorld::new(config).is_err());
    }

    #[test]
    fn test_unrepresentable_duration_rejected() {
        for secs in [-1.0, f64::NAN, f64::INFINITY, 1e300] {
            let config = SimConfig {
                max_duration_secs: secs,
                ..SimConfig::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{} accepted", secs);
            assert_eq!(config.max_duration(), Duration::ZERO);
        }

        let zero = SimConfig {
            max_duration_secs: 0.0,
            ..SimConfig::default()
        };
        assert!(zero.validate().is_ok());
    }

    #[test]
    fn test_load_validates_file() {
        let path = std::env::temp_dir().join(format!("herald-sim-step-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "step_ms": 0 }"#).unwrap();

        let result = SimConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
