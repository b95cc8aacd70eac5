//! Scenario runner - executes broadcast scenarios against a `SimWorld`.

use crate::exporter::{SimEvent, TimelineExport, TimelineFrame};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use herald_core::config::percent_of;
use herald_core::{
    Broadcast, BroadcastError, BroadcastStatus, ConfigError, CreateBroadcast, MessageContent, Schedule, TargetSelector,
    ValidationError,
};
use herald_env::HeraldContext;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// RNG stream the burst scenario draws its workload from.
const WORKLOAD_STREAM: u64 = 2;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    #[serde(serialize_with = "serialize_scenario")]
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total steps executed
    pub total_steps: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of stored broadcasts at end
    pub broadcast_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

fn serialize_scenario<S: serde::Serializer>(scenario: &ScenarioId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(scenario.name())
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Broadcasts accepted by the engine
    pub created: u64,

    /// Requests rejected by validation
    pub rejected: u64,

    /// Scheduled broadcasts dispatched by the loop
    pub dispatched: u64,

    pub completed: u64,

    pub failed: u64,

    /// Drip ticks processed
    pub drip_updates: u64,

    /// Timer events that arrived after their step had passed
    pub stale_events: u64,

    /// Store updates published to subscribers
    pub store_updates: u64,

    /// Invariant violations recorded by the oracle
    pub violations: usize,
}

/// Runs broadcast scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner with default configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_config(SimConfig {
            seed,
            ..SimConfig::default()
        })
    }

    /// Creates a runner from a full configuration; the seed comes from it.
    pub fn with_config(config: SimConfig) -> Self {
        Self {
            seed: config.seed,
            config,
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.max_duration_secs = secs;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None).0
    }

    /// Runs a scenario and records a frame of broadcast state at every step.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, TimelineExport) {
        let export = TimelineExport::new(scenario.name(), self.seed);
        let (result, export) = self.execute(scenario, Some(export));
        let mut export = export.unwrap_or_else(|| TimelineExport::new(scenario.name(), self.seed));
        export.passed = result.passed;
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: Option<TimelineExport>) -> (ScenarioResult, Option<TimelineExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut config = self.config.clone();
        if scenario == ScenarioId::DripCeiling {
            // Seed rate close to the ceiling so increments have to clamp
            config.engine.seed_open_percent = config.engine.drip.ceiling_percent.saturating_sub(2);
        }

        let mut run = match Run::new(config, export) {
            Ok(run) => run,
            Err((err, export)) => {
                warn!("  ✗ invalid configuration: {}", err);
                return (self.rejected(scenario, err), export);
            }
        };
        match scenario {
            ScenarioId::ImmediateSend => self.run_immediate_send(&mut run),
            ScenarioId::ScheduledSegment => self.run_scheduled_segment(&mut run),
            ScenarioId::IdempotentDispatch => self.run_idempotent_dispatch(&mut run),
            ScenarioId::DripCeiling => self.run_drip_ceiling(&mut run),
            ScenarioId::InvalidSelector => self.run_invalid_selector(&mut run),
            ScenarioId::UnresolvableAudience => self.run_unresolvable_audience(&mut run),
            ScenarioId::DraftSubmission => self.run_draft_submission(&mut run),
            ScenarioId::LoopRestart => self.run_loop_restart(&mut run),
            ScenarioId::Burst => self.run_burst(&mut run),
        }

        run.finish(scenario, self.seed)
    }

    /// Result for a scenario that could not start.
    fn rejected(&self, scenario: ScenarioId, err: ConfigError) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_steps: 0,
            final_time_secs: 0.0,
            broadcast_count: 0,
            failure_reason: Some(format!("invalid configuration: {}", err)),
            metrics: ScenarioMetrics::default(),
        }
    }

    /// SIM-001: "All users" broadcast sent immediately.
    ///
    /// **Assertion**: 3252 of 5420 opened at completion; drip never passes 80%.
    fn run_immediate_send(&self, run: &mut Run) {
        info!("SIM-001: ImmediateSend");

        let Some(b) = run.create(request("Launch", TargetSelector::All, Schedule::Immediate)) else {
            return;
        };
        run.check(b.status == BroadcastStatus::Sending, "immediate broadcast should start in sending");
        run.check(b.delivered_count == 0 && b.sent_at.is_none(), "sending broadcast has no counters yet");

        run.step_for(run.world.config.engine.completion_delay());
        let audience = b.audience_count;
        let seed_opened = percent_of(audience, run.world.config.engine.seed_open_percent);
        if let Some(done) = run.world.get(&b.id).cloned() {
            run.check(done.status == BroadcastStatus::Completed, "broadcast should complete after the delay");
            run.check(done.delivered_count == audience, "delivered equals audience");
            run.check(
                done.opened_count == seed_opened,
                format!("opened {} at completion, expected {}", done.opened_count, seed_opened),
            );
        }

        run.until_idle();
        let ceiling = percent_of(audience, run.world.config.engine.drip.ceiling_percent);
        if let Some(opened) = run.world.get(&b.id).map(|done| done.opened_count) {
            run.check(opened >= seed_opened, "opened count shrank during drip");
            run.check(opened <= ceiling, format!("opened {} above ceiling {}", opened, ceiling));
        }
        let max_updates = run.world.config.engine.drip.max_updates as u64;
        run.check(
            run.world.stats().drip_updates <= max_updates,
            "drip ran more ticks than its budget",
        );
    }

    /// SIM-002: Segment broadcast due a few seconds ahead.
    ///
    /// **Assertion**: nothing happens before the first tick; dispatched once.
    fn run_scheduled_segment(&self, run: &mut Run) {
        info!("SIM-002: ScheduledSegment");

        let due = run.world.now_plus(Duration::from_secs(5));
        let Some(b) = run.create(request("Segment promo", TargetSelector::segments(["A"]), Schedule::At(due))) else {
            return;
        };
        run.check(b.status == BroadcastStatus::Scheduled, "future broadcast should be scheduled");

        let tick = run.world.config.engine.tick_interval();
        run.step_for(tick.saturating_sub(Duration::from_millis(run.world.config.step_ms)));
        run.check(
            run.status(&b) == Some(BroadcastStatus::Scheduled),
            "broadcast dispatched before the first tick",
        );

        run.until_idle();
        if let Some(done) = run.world.get(&b.id).cloned() {
            let delivered = done.delivered_count;
            run.check(done.status == BroadcastStatus::Completed, "scheduled broadcast should complete");
            run.check(delivered == b.audience_count, format!("delivered {} to segment", delivered));
        }
        run.check(run.world.oracle().dispatch_count(&b.id) == 1, "scheduled broadcast dispatched exactly once");
    }

    /// SIM-003: Ten ticks back to back at the due instant.
    fn run_idempotent_dispatch(&self, run: &mut Run) {
        info!("SIM-003: IdempotentDispatch");

        let due = run.world.now_plus(Duration::from_secs(1));
        let Some(b) = run.create(request("Flash sale", TargetSelector::segments(["B"]), Schedule::At(due))) else {
            return;
        };
        run.step_for(Duration::from_secs(2));

        let emitted = run.world.tick_burst(10);
        run.check(emitted == 1, format!("{} dispatches from a tick burst", emitted));

        run.until_idle();
        let late = run.world.tick_burst(5);
        run.check(late == 0, "completed broadcast dispatched again");
        run.check(run.world.oracle().dispatch_count(&b.id) == 1, "broadcast dispatched more than once");
        run.check(run.world.stats().dispatched == 1, "engine processed more than one dispatch");
    }

    /// SIM-004: Drip increments clamped by the ceiling.
    fn run_drip_ceiling(&self, run: &mut Run) {
        info!("SIM-004: DripCeiling");

        let Some(b) = run.create(request("Reminder", TargetSelector::All, Schedule::Immediate)) else {
            return;
        };
        let ceiling = percent_of(b.audience_count, run.world.config.engine.drip.ceiling_percent);

        let limit = run.limit();
        while run.world.context.now() < limit && !run.world.is_idle() {
            run.step();
            if let Some(opened) = run.world.get(&b.id).map(|current| current.opened_count) {
                if opened > ceiling {
                    run.fail(format!("opened {} above ceiling {} at t={:.1}s", opened, ceiling, run.world.time()));
                    break;
                }
            }
        }
        run.check(run.world.is_idle(), "drip did not finish");
        let opened = run.world.get(&b.id).map_or(0, |b| b.opened_count);
        debug!(opened, ceiling, "drip settled");
    }

    /// SIM-005: Empty selections never reach the store.
    fn run_invalid_selector(&self, run: &mut Run) {
        info!("SIM-005: InvalidSelector");

        let rejected = [
            request("No segments", TargetSelector::Segments(Default::default()), Schedule::Immediate),
            request("No users", TargetSelector::Users(Default::default()), Schedule::Immediate),
            request("   ", TargetSelector::All, Schedule::Immediate),
        ];
        for req in rejected {
            match run.world.create(req) {
                Err(BroadcastError::Validation(err)) => {
                    run.metrics.rejected += 1;
                    debug!(error = %err, "request rejected");
                }
                Ok(b) => run.fail(format!("invalid request stored as {}", b.id)),
                Err(other) => run.fail(format!("unexpected error: {}", other)),
            }
        }
        run.check(run.world.store().is_empty(), "rejected requests left broadcasts behind");

        let empty = CreateBroadcast::new("Blank", TargetSelector::All, MessageContent::text(""), Schedule::Immediate);
        let empty_content = matches!(
            run.world.create(empty),
            Err(BroadcastError::Validation(ValidationError::EmptyContent))
        );
        if empty_content {
            run.metrics.rejected += 1;
        }
        run.check(empty_content, "empty content accepted");

        let users = run.create(request("Direct", TargetSelector::users(["u1", "u2", "u3"]), Schedule::Immediate));
        run.check(
            users.map(|b| b.audience_count) == Some(3),
            "user selection should resolve to its size",
        );
        run.until_idle();
    }

    /// SIM-006: Unknown segment fails on entering `Sending`.
    fn run_unresolvable_audience(&self, run: &mut Run) {
        info!("SIM-006: UnresolvableAudience");

        let now = run.create(request("Ghosts", TargetSelector::segments(["ghost"]), Schedule::Immediate));
        if let Some(b) = now {
            run.check(b.status == BroadcastStatus::Failed, "immediate send to unknown segment should fail");
            run.check(b.failure_reason.is_some(), "failed broadcast has no reason");
            run.check(b.delivered_count == 0 && b.opened_count == 0, "failed broadcast has counters");
        }

        let due = run.world.now_plus(Duration::from_secs(3));
        let Some(later) = run.create(request("Ghosts later", TargetSelector::segments(["A", "ghost"]), Schedule::At(due)))
        else {
            return;
        };
        run.check(later.status == BroadcastStatus::Scheduled, "resolution error should not block scheduling");
        run.check(later.resolution_error.is_some(), "resolution error not recorded at creation");

        run.until_idle();
        let reason = run.world.get(&later.id).and_then(|b| b.failure_reason.clone());
        run.check(run.status(&later) == Some(BroadcastStatus::Failed), "scheduled broadcast should fail at dispatch");
        run.check(
            reason.as_deref().map_or(false, |r| r.contains("ghost")),
            format!("failure reason should name the segment, got {:?}", reason),
        );
    }

    /// SIM-007: Drafts are ignored by the loop until submitted.
    fn run_draft_submission(&self, run: &mut Run) {
        info!("SIM-007: DraftSubmission");

        let due = run.world.now_plus(Duration::from_secs(3));
        let Some(b) = run.create(request("Newsletter", TargetSelector::All, Schedule::At(due)).as_draft()) else {
            return;
        };
        run.check(b.status == BroadcastStatus::Draft, "draft should stay a draft");

        run.step_for(run.world.config.engine.tick_interval() * 2);
        run.check(run.status(&b) == Some(BroadcastStatus::Draft), "loop picked up a draft");

        match run.world.submit_draft(&b.id) {
            Ok(submitted) => {
                run.check(submitted.status == BroadcastStatus::Scheduled, "past-due draft should be scheduled")
            }
            Err(err) => run.fail(format!("submit failed: {}", err)),
        }
        let resubmit_rejected = matches!(
            run.world.submit_draft(&b.id),
            Err(BroadcastError::InvalidTransition { .. })
        );
        run.check(resubmit_rejected, "draft submitted twice");

        run.until_idle();
        run.check(run.status(&b) == Some(BroadcastStatus::Completed), "submitted draft should complete");
    }

    /// SIM-008: A fresh scheduling loop does not re-dispatch.
    fn run_loop_restart(&self, run: &mut Run) {
        info!("SIM-008: LoopRestart");

        let due = run.world.now_plus(Duration::from_secs(1));
        let Some(first) = run.create(request("Before restart", TargetSelector::segments(["vip"]), Schedule::At(due)))
        else {
            return;
        };
        let tick = run.world.config.engine.tick_interval();
        run.step_for(tick);
        run.check(run.status(&first) == Some(BroadcastStatus::Sending), "first broadcast not dispatched");

        run.world.restart_loop();
        run.record(SimEvent::info("scheduling loop restarted"));

        let due = run.world.now_plus(tick);
        let Some(second) = run.create(request("After restart", TargetSelector::segments(["vip"]), Schedule::At(due)))
        else {
            return;
        };
        run.step_for(tick * 3);
        run.until_idle();

        for b in [&first, &second] {
            let count = run.world.oracle().dispatch_count(&b.id);
            run.check(count == 1, format!("{} dispatched {} times", b.id, count));
            run.check(run.status(b) == Some(BroadcastStatus::Completed), "broadcast did not complete");
        }
    }

    /// SIM-009: Random workload.
    fn run_burst(&self, run: &mut Run) {
        info!("SIM-009: Burst");

        let mut rng = run.world.context.derive_rng(WORKLOAD_STREAM);
        let segments = ["A", "B", "vip"];
        let mut ids = Vec::new();

        for i in 0..40 {
            let target = match rng.gen_range(0..4) {
                0 => TargetSelector::All,
                1 => TargetSelector::segments([segments[rng.gen_range(0..segments.len())]]),
                2 => TargetSelector::segments(segments),
                _ => TargetSelector::users((0..rng.gen_range(1..50)).map(|u| format!("user-{}", u))),
            };
            let schedule = if rng.gen_bool(0.3) {
                Schedule::Immediate
            } else {
                Schedule::At(run.world.now_plus(Duration::from_millis(rng.gen_range(0..60_000))))
            };
            if let Some(b) = run.create(request(&format!("Burst {}", i), target, schedule)) {
                ids.push(b.id);
            }
            // Spread creation over the first few seconds
            if rng.gen_bool(0.25) {
                run.step();
            }
        }

        let idle = run.until_idle();
        run.check(idle, "workload did not settle before the time limit");

        let ceiling_percent = run.world.config.engine.drip.ceiling_percent;
        for id in &ids {
            let Some(b) = run.world.get(id).cloned() else {
                run.fail(format!("{} vanished", id));
                continue;
            };
            run.check(b.status == BroadcastStatus::Completed, format!("{} ended {}", b.id, b.status));
            run.check(
                b.opened_count <= percent_of(b.audience_count, ceiling_percent),
                format!("{} opened above ceiling", b.id),
            );
            run.check(run.world.oracle().dispatch_count(id) <= 1, format!("{} dispatched twice", b.id));
        }
    }
}

fn request(title: &str, target: TargetSelector, schedule: Schedule) -> CreateBroadcast {
    CreateBroadcast::new(title, target, MessageContent::text("Hello from the simulation"), schedule)
}

/// One scenario execution: the world, its optional timeline, and failed checks.
struct Run {
    world: SimWorld,
    export: Option<TimelineExport>,
    pending_events: Vec<SimEvent>,
    failures: Vec<String>,
    metrics: ScenarioMetrics,
}

impl Run {
    /// Hands the export back when the configuration is rejected.
    fn new(config: SimConfig, export: Option<TimelineExport>) -> Result<Self, (ConfigError, Option<TimelineExport>)> {
        match SimWorld::new(config) {
            Ok(world) => Ok(Self {
                world,
                export,
                pending_events: Vec::new(),
                failures: Vec::new(),
                metrics: ScenarioMetrics::default(),
            }),
            Err(err) => Err((err, export)),
        }
    }

    fn limit(&self) -> Duration {
        self.world.config.max_duration()
    }

    fn create(&mut self, request: CreateBroadcast) -> Option<Broadcast> {
        match self.world.create(request) {
            Ok(b) => {
                self.record(SimEvent::info(format!("created {} ({})", b.id, b.status)));
                Some(b)
            }
            Err(err) => {
                self.fail(format!("create failed: {}", err));
                None
            }
        }
    }

    fn status(&self, b: &Broadcast) -> Option<BroadcastStatus> {
        self.world.get(&b.id).map(|b| b.status)
    }

    fn step(&mut self) {
        self.world.step();
        if let Some(export) = self.export.as_mut() {
            let mut frame = TimelineFrame::capture(self.world.time(), self.world.store());
            frame.events = std::mem::take(&mut self.pending_events);
            export.add_frame(frame);
        }
    }

    fn step_for(&mut self, duration: Duration) {
        let end = (self.world.context.now() + duration).min(self.limit());
        while self.world.context.now() < end {
            self.step();
        }
    }

    fn until_idle(&mut self) -> bool {
        let limit = self.limit();
        while self.world.context.now() < limit {
            if self.world.is_idle() {
                return true;
            }
            self.step();
        }
        self.world.is_idle()
    }

    fn record(&mut self, event: SimEvent) {
        if self.export.is_some() {
            self.pending_events.push(event);
        }
    }

    fn check(&mut self, condition: bool, message: impl Into<String>) {
        if !condition {
            self.fail(message);
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("  ✗ {}", message);
        self.record(SimEvent::error(message.clone()));
        self.failures.push(message);
    }

    fn finish(mut self, scenario: ScenarioId, seed: u64) -> (ScenarioResult, Option<TimelineExport>) {
        let stats = self.world.stats();
        let violations = self.world.oracle().violations().to_vec();
        for v in &violations {
            self.failures
                .push(format!("invariant violated at t={:.1}s for {}: {}", v.time_sec, v.broadcast, v.message));
        }

        let metrics = ScenarioMetrics {
            created: stats.created,
            rejected: self.metrics.rejected,
            dispatched: stats.dispatched,
            completed: stats.completed,
            failed: stats.failed,
            drip_updates: stats.drip_updates,
            stale_events: stats.stale_events,
            store_updates: self.world.updates_seen(),
            violations: violations.len(),
        };

        let passed = self.failures.is_empty();
        if passed {
            info!(
                "✓ {} complete: {} created, {} completed, {} failed",
                scenario.name(),
                metrics.created,
                metrics.completed,
                metrics.failed
            );
        }

        if let Some(export) = self.export.as_mut() {
            if !self.pending_events.is_empty() {
                let mut frame = TimelineFrame::capture(self.world.time(), self.world.store());
                frame.events = std::mem::take(&mut self.pending_events);
                export.add_frame(frame);
            }
            export.finalize(passed, &violations);
        }

        let result = ScenarioResult {
            scenario,
            seed,
            passed,
            total_steps: self.world.step_count(),
            final_time_secs: self.world.time(),
            broadcast_count: self.world.store().len(),
            failure_reason: if passed { None } else { Some(self.failures.join("; ")) },
            metrics,
        };
        (result, self.export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_every_scenario_passes_default_seed() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(result.passed, "{} failed: {:?}", scenario, result.failure_reason);
            assert_eq!(result.metrics.violations, 0);
        }
    }

    #[test]
    fn test_immediate_send_metrics() {
        let result = ScenarioRunner::new(42).run(ScenarioId::ImmediateSend);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.broadcast_count, 1);
        assert_eq!(result.metrics.created, 1);
        assert_eq!(result.metrics.completed, 1);
        assert_eq!(result.metrics.dispatched, 0);
        assert!(result.metrics.drip_updates <= 5);
    }

    #[test]
    fn test_invalid_selector_counts_rejections() {
        let result = ScenarioRunner::new(1).run(ScenarioId::InvalidSelector);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.rejected, 4);
        assert_eq!(result.broadcast_count, 1);
    }

    #[test]
    fn test_burst_deterministic() {
        let a = ScenarioRunner::new(99).run(ScenarioId::Burst);
        let b = ScenarioRunner::new(99).run(ScenarioId::Burst);

        assert!(a.passed, "{:?}", a.failure_reason);
        assert_eq!(a.total_steps, b.total_steps);
        assert_eq!(a.metrics.drip_updates, b.metrics.drip_updates);
        assert_eq!(a.metrics.store_updates, b.metrics.store_updates);
    }

    #[test]
    fn test_draft_submission_rejects_resubmit() {
        let result = ScenarioRunner::new(42).run(ScenarioId::DraftSubmission);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.created, 1);
        assert_eq!(result.metrics.dispatched, 1);
        assert_eq!(result.metrics.completed, 1);
    }

    #[test]
    fn test_invalid_duration_fails_without_running() {
        for secs in [-1.0, f64::NAN] {
            let result = ScenarioRunner::new(42).with_duration(secs).run(ScenarioId::ImmediateSend);

            assert!(!result.passed);
            assert_eq!(result.total_steps, 0);
            assert!(result.failure_reason.unwrap().contains("max_duration_secs"));
        }
    }

    #[test]
    fn test_zero_step_fails_without_running() {
        let config = SimConfig {
            step_ms: 0,
            ..SimConfig::default()
        };
        let (result, export) = ScenarioRunner::with_config(config).run_with_export(ScenarioId::Burst);

        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("step_ms"));
        assert!(export.frames.is_empty());
        assert!(!export.passed);
    }

    #[test]
    fn test_short_duration_fails_burst() {
        let result = ScenarioRunner::new(42).with_duration(10.0).run(ScenarioId::Burst);

        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("did not settle"));
    }

    #[test]
    fn test_export_has_frame_per_step() {
        let (result, export) = ScenarioRunner::new(42).run_with_export(ScenarioId::ScheduledSegment);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(export.passed);
        assert!(export.frames.len() as u64 >= result.total_steps);
        assert!(export.frames.iter().any(|f| f
            .broadcasts
            .iter()
            .any(|b| b.status == "completed")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_burst_holds_invariants(seed in any::<u64>()) {
            let result = ScenarioRunner::new(seed).run(ScenarioId::Burst);
            prop_assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
        }

        #[test]
        fn prop_drip_stays_under_ceiling(seed in any::<u64>(), users in 1u64..200_000) {
            let mut config = SimConfig { seed, ..SimConfig::default() };
            config.audience.total_users = users;
            let result = ScenarioRunner::with_config(config).run(ScenarioId::DripCeiling);
            prop_assert!(result.passed, "seed {} users {}: {:?}", seed, users, result.failure_reason);
        }
    }
}
