//! Service runtime - runs the engine against a [`HeraldContext`].
//!
//! Three kinds of tasks cooperate, all spawned through the context:
//!
//! ```text
//!  ServiceHandle ──Command──┐
//!                           ▼
//!  scheduling loop ──► [ worker ] ◄── timer task (sleep, then Fire(event))
//!   (owns the guard)     owns the engine, arms timers, publishes updates
//! ```
//!
//! The worker is the only place the store is mutated, so every event is
//! applied against current state. Timers never capture broadcast data;
//! they only carry an [`EngineEvent`].

use chrono::{DateTime, Utc};
use herald_env::{EnvError, HeraldContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audience::AudienceResolver;
use crate::config::EngineConfig;
use crate::engine::{BroadcastEngine, EngineEvent, EngineStats, TimerRequest};
use crate::error::BroadcastError;
use crate::model::{Broadcast, BroadcastId, BroadcastUpdate, CreateBroadcast};
use crate::scheduler::SchedulingLoop;
use crate::store::{BroadcastFilter, BroadcastStore, StoreSnapshot, StoreSummary};

/// RNG stream reserved for the engine.
const ENGINE_RNG_STREAM: u64 = 0x6865_7261_6c64;

const COMMAND_BUFFER: usize = 1024;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Create {
        request: CreateBroadcast,
        reply: Reply<Result<Broadcast, BroadcastError>>,
    },
    SubmitDraft {
        id: BroadcastId,
        reply: Reply<Result<Broadcast, BroadcastError>>,
    },
    Get {
        id: BroadcastId,
        reply: Reply<Option<Broadcast>>,
    },
    List {
        filter: BroadcastFilter,
        reply: Reply<Vec<Broadcast>>,
    },
    Summary {
        reply: Reply<StoreSummary>,
    },
    Snapshot {
        reply: Reply<StoreSnapshot>,
    },
    Stats {
        reply: Reply<EngineStats>,
    },
    DueScheduled {
        reply: Reply<Vec<BroadcastId>>,
    },
    Fire(EngineEvent),
    Shutdown {
        reply: Reply<()>,
    },
}

/// Entry points for starting the service.
pub struct BroadcastService;

impl BroadcastService {
    /// Starts a service with an empty store.
    pub fn start<Ctx, R>(ctx: Arc<Ctx>, config: EngineConfig, resolver: R) -> Result<ServiceHandle, BroadcastError>
    where
        Ctx: HeraldContext,
        R: AudienceResolver,
    {
        Self::restore(ctx, config, resolver, StoreSnapshot::default())
    }

    /// Starts a service over a previously taken snapshot.
    ///
    /// `Scheduled` broadcasts are picked up by the first scheduling tick;
    /// `Sending` ones get their completion timer re-armed.
    pub fn restore<Ctx, R>(
        ctx: Arc<Ctx>,
        config: EngineConfig,
        resolver: R,
        snapshot: StoreSnapshot,
    ) -> Result<ServiceHandle, BroadcastError>
    where
        Ctx: HeraldContext,
        R: AudienceResolver,
    {
        config.validate()?;

        let tick_interval = config.tick_interval();
        let (updates, _) = broadcast::channel(config.update_buffer);
        let rng = ctx.derive_rng(ENGINE_RNG_STREAM);
        let engine = BroadcastEngine::with_store(config, resolver, rng, BroadcastStore::from_snapshot(snapshot));
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);

        let resumed = engine.resume();
        if !resumed.is_empty() {
            info!(count = resumed.len(), "re-arming in-flight completions");
        }
        for timer in resumed {
            arm_timer(&ctx, commands.clone(), timer);
        }

        let worker = Worker {
            ctx: Arc::clone(&ctx),
            engine,
            commands: commands.downgrade(),
            updates: updates.clone(),
        };
        ctx.spawn("broadcast-worker", worker.run(rx));
        ctx.spawn(
            "scheduling-loop",
            run_scheduling_loop(Arc::clone(&ctx), commands.downgrade(), tick_interval),
        );

        info!(seed = ctx.seed(), tick_ms = tick_interval.as_millis() as u64, "broadcast service started");
        Ok(ServiceHandle { commands, updates })
    }
}

/// Cloneable handle used by collaborators (UI, API layers) to talk to the service.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<BroadcastUpdate>,
}

impl ServiceHandle {
    pub async fn create_broadcast(&self, request: CreateBroadcast) -> Result<Broadcast, BroadcastError> {
        self.request(|reply| Command::Create { request, reply }).await?
    }

    pub async fn submit_draft(&self, id: BroadcastId) -> Result<Broadcast, BroadcastError> {
        self.request(|reply| Command::SubmitDraft { id, reply }).await?
    }

    pub async fn get_broadcast(&self, id: BroadcastId) -> Result<Option<Broadcast>, BroadcastError> {
        self.request(|reply| Command::Get { id, reply }).await
    }

    pub async fn list_broadcasts(&self, filter: BroadcastFilter) -> Result<Vec<Broadcast>, BroadcastError> {
        self.request(|reply| Command::List { filter, reply }).await
    }

    pub async fn summary(&self) -> Result<StoreSummary, BroadcastError> {
        self.request(|reply| Command::Summary { reply }).await
    }

    pub async fn snapshot(&self) -> Result<StoreSnapshot, BroadcastError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn stats(&self) -> Result<EngineStats, BroadcastError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Live stream of status and counter changes.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastUpdate> {
        self.updates.subscribe()
    }

    /// Stops the worker. Pending timers are abandoned and the scheduling
    /// loop exits on its next tick.
    pub async fn shutdown(&self) -> Result<(), BroadcastError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, BroadcastError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| EnvError::closed("broadcast worker"))?;
        Ok(rx.await.map_err(|_| EnvError::closed("broadcast worker reply"))?)
    }
}

/// Owns the engine; the single writer of the store.
struct Worker<Ctx: HeraldContext, R: AudienceResolver> {
    ctx: Arc<Ctx>,
    engine: BroadcastEngine<R>,
    /// Weak so that the worker alone does not keep its own channel open
    commands: mpsc::WeakSender<Command>,
    updates: broadcast::Sender<BroadcastUpdate>,
}

impl<Ctx: HeraldContext, R: AudienceResolver> Worker<Ctx, R> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            let now = self.wall_clock();
            let timers = match command {
                Command::Create { request, reply } => {
                    let (result, timers) = split(self.engine.create_broadcast(request, now));
                    let _ = reply.send(result);
                    timers
                }
                Command::SubmitDraft { id, reply } => {
                    let (result, timers) = split(self.engine.submit_draft(&id));
                    let _ = reply.send(result);
                    timers
                }
                Command::Get { id, reply } => {
                    let _ = reply.send(self.engine.get(&id).cloned());
                    Vec::new()
                }
                Command::List { filter, reply } => {
                    let _ = reply.send(self.engine.list(&filter));
                    Vec::new()
                }
                Command::Summary { reply } => {
                    let _ = reply.send(self.engine.summary());
                    Vec::new()
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.engine.snapshot());
                    Vec::new()
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.engine.stats());
                    Vec::new()
                }
                Command::DueScheduled { reply } => {
                    let _ = reply.send(self.engine.store().due_scheduled(now));
                    Vec::new()
                }
                Command::Fire(event) => match self.engine.handle(event, now) {
                    Ok(timers) => timers,
                    Err(err) => {
                        // Isolated: the broadcast keeps its last consistent state.
                        warn!(id = %event.broadcast_id(), event = event.name(), error = %err, "event failed");
                        Vec::new()
                    }
                },
                Command::Shutdown { reply } => {
                    self.publish();
                    let _ = reply.send(());
                    break;
                }
            };

            for timer in timers {
                match self.commands.upgrade() {
                    Some(tx) => arm_timer(&self.ctx, tx, timer),
                    None => debug!(event = timer.event.name(), "no senders left, timer dropped"),
                }
            }
            self.publish();
        }
        info!(stats = ?self.engine.stats(), "broadcast worker stopped");
    }

    fn publish(&mut self) {
        for update in self.engine.drain_updates() {
            // No subscribers is fine
            let _ = self.updates.send(update);
        }
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.ctx.system_time())
    }
}

fn split(result: Result<(Broadcast, Vec<TimerRequest>), BroadcastError>) -> (Result<Broadcast, BroadcastError>, Vec<TimerRequest>) {
    match result {
        Ok((broadcast, timers)) => (Ok(broadcast), timers),
        Err(err) => (Err(err), Vec::new()),
    }
}

/// Spawns a one-shot timer that delivers `timer.event` to the worker.
fn arm_timer<Ctx: HeraldContext>(ctx: &Arc<Ctx>, tx: mpsc::Sender<Command>, timer: TimerRequest) {
    let sleeper = Arc::clone(ctx);
    ctx.spawn(timer.event.name(), async move {
        sleeper.sleep(timer.delay).await;
        if tx.send(Command::Fire(timer.event)).await.is_err() {
            debug!(event = timer.event.name(), "worker stopped, timer abandoned");
        }
    });
}

/// Periodic scan-and-dispatch. The [`SchedulingLoop`] (and its guard) lives
/// exactly as long as this task.
async fn run_scheduling_loop<Ctx: HeraldContext>(
    ctx: Arc<Ctx>,
    commands: mpsc::WeakSender<Command>,
    interval: Duration,
) {
    let mut scheduler = SchedulingLoop::new();
    info!(interval_ms = interval.as_millis() as u64, "scheduling loop started");

    'ticks: loop {
        ctx.sleep(interval).await;

        let Some(tx) = commands.upgrade() else {
            break;
        };
        let (reply, rx) = oneshot::channel();
        if tx.send(Command::DueScheduled { reply }).await.is_err() {
            break;
        }
        let Ok(due) = rx.await else {
            break;
        };

        for event in scheduler.claim_due(&due) {
            if tx.send(Command::Fire(event)).await.is_err() {
                break 'ticks;
            }
        }
    }

    info!(stats = ?scheduler.stats(), "scheduling loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audience::StaticAudience;
    use crate::error::ValidationError;
    use crate::model::{BroadcastStatus, MessageContent, Schedule, TargetSelector};
    use herald_env::TokioContext;
    use tokio::sync::broadcast::error::TryRecvError;

    fn audience() -> StaticAudience {
        StaticAudience::new(5420).with_segment("A", 234)
    }

    fn request(target: TargetSelector, schedule: Schedule) -> CreateBroadcast {
        CreateBroadcast::new("Flash sale", target, MessageContent::text("Today only"), schedule)
    }

    async fn sleep_secs(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_broadcast_completes() {
        let ctx = TokioContext::shared();
        let service = BroadcastService::start(ctx, EngineConfig::default(), audience()).unwrap();

        let b = service
            .create_broadcast(request(TargetSelector::All, Schedule::Immediate))
            .await
            .unwrap();
        assert_eq!(b.status, BroadcastStatus::Sending);

        sleep_secs(2.5).await;
        let done = service.get_broadcast(b.id).await.unwrap().unwrap();
        assert_eq!(done.status, BroadcastStatus::Completed);
        assert_eq!(done.delivered_count, 5420);
        assert_eq!(done.opened_count, 3252);
        assert!(done.sent_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_broadcast_dispatched_by_loop() {
        let ctx = TokioContext::shared();
        let due = DateTime::<Utc>::from(ctx.system_time()) + chrono::Duration::seconds(15);
        let service = BroadcastService::start(ctx, EngineConfig::default(), audience()).unwrap();

        let b = service
            .create_broadcast(request(TargetSelector::segments(["A"]), Schedule::At(due)))
            .await
            .unwrap();
        assert_eq!(b.status, BroadcastStatus::Scheduled);
        assert_eq!(b.audience_count, 234);

        sleep_secs(10.0).await;
        assert_eq!(
            service.get_broadcast(b.id).await.unwrap().unwrap().status,
            BroadcastStatus::Scheduled
        );

        // Due at 15s; picked up by the 15s or 30s tick, completed 2s later
        sleep_secs(25.0).await;
        let done = service.get_broadcast(b.id).await.unwrap().unwrap();
        assert_eq!(done.status, BroadcastStatus::Completed);
        assert_eq!(done.delivered_count, 234);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_event_does_not_stop_worker() {
        let ctx = TokioContext::shared();
        let due = DateTime::<Utc>::from(ctx.system_time());
        let config = EngineConfig {
            tick_interval_ms: 100,
            ..Default::default()
        };
        let service = BroadcastService::start(ctx, config, audience()).unwrap();

        // Event for a broadcast the store has never seen
        service
            .commands
            .send(Command::Fire(EngineEvent::Dispatch(BroadcastId::from_seed(99))))
            .await
            .unwrap();

        let ghost = service
            .create_broadcast(request(TargetSelector::segments(["ghost"]), Schedule::At(due)))
            .await
            .unwrap();
        let healthy = service
            .create_broadcast(request(TargetSelector::segments(["A"]), Schedule::At(due)))
            .await
            .unwrap();

        sleep_secs(3.0).await;
        let failed = service.get_broadcast(ghost.id).await.unwrap().unwrap();
        assert_eq!(failed.status, BroadcastStatus::Failed);
        let done = service.get_broadcast(healthy.id).await.unwrap().unwrap();
        assert_eq!(done.status, BroadcastStatus::Completed);
        assert_eq!(done.delivered_count, 234);

        // Later broadcasts still go through
        let later = service
            .create_broadcast(request(TargetSelector::All, Schedule::Immediate))
            .await
            .unwrap();
        sleep_secs(2.5).await;
        let later = service.get_broadcast(later.id).await.unwrap().unwrap();
        assert_eq!(later.status, BroadcastStatus::Completed);
        assert_eq!(later.opened_count, 3252);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_ticks_dispatch_once() {
        let ctx = TokioContext::shared();
        let due = DateTime::<Utc>::from(ctx.system_time());
        let config = EngineConfig {
            tick_interval_ms: 100,
            ..Default::default()
        };
        let service = BroadcastService::start(ctx, config, audience()).unwrap();
        let mut updates = service.subscribe();

        service
            .create_broadcast(request(TargetSelector::All, Schedule::At(due)))
            .await
            .unwrap();

        // Dozens of ticks observe the broadcast after it became due
        sleep_secs(60.0).await;

        let mut completions = 0;
        let mut sendings = 0;
        loop {
            match updates.try_recv() {
                Ok(u) if u.status == BroadcastStatus::Sending => sendings += 1,
                // Drip updates also carry `Completed`, but never the seeded count
                Ok(u) if u.status == BroadcastStatus::Completed && u.opened_count == 3252 => completions += 1,
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(err) => panic!("unexpected: {:?}", err),
            }
        }
        assert_eq!(sendings, 1);
        assert_eq!(completions, 1);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opened_count_monotonic_and_bounded() {
        let ctx = TokioContext::shared();
        let service = BroadcastService::start(ctx, EngineConfig::default(), StaticAudience::new(1000)).unwrap();
        let mut updates = service.subscribe();

        let b = service
            .create_broadcast(request(TargetSelector::All, Schedule::Immediate))
            .await
            .unwrap();
        sleep_secs(60.0).await;

        let mut last = 0;
        while let Ok(u) = updates.try_recv() {
            assert!(u.opened_count >= last);
            assert!(u.opened_count <= u.delivered_count);
            assert!(u.opened_count <= 800);
            last = u.opened_count;
        }
        let done = service.get_broadcast(b.id).await.unwrap().unwrap();
        assert!(done.opened_count >= 600 && done.opened_count <= 800);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_is_not_stored() {
        let ctx = TokioContext::shared();
        let service = BroadcastService::start(ctx, EngineConfig::default(), audience()).unwrap();

        let err = service
            .create_broadcast(request(TargetSelector::users(Vec::<String>::new()), Schedule::Immediate))
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::Validation(ValidationError::EmptySelection(_))));
        assert!(service.list_broadcasts(BroadcastFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_completes_in_flight_send() {
        let ctx = TokioContext::shared();
        let service = BroadcastService::start(Arc::clone(&ctx), EngineConfig::default(), audience()).unwrap();
        let b = service
            .create_broadcast(request(TargetSelector::All, Schedule::Immediate))
            .await
            .unwrap();
        let snapshot = service.snapshot().await.unwrap();
        service.shutdown().await.unwrap();

        let restored = BroadcastService::restore(ctx, EngineConfig::default(), audience(), snapshot).unwrap();
        sleep_secs(3.0).await;

        let done = restored.get_broadcast(b.id).await.unwrap().unwrap();
        assert_eq!(done.status, BroadcastStatus::Completed);
        assert_eq!(restored.stats().await.unwrap().completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_dispatched_broadcast_is_not_redispatched() {
        let ctx = TokioContext::shared();
        let due = DateTime::<Utc>::from(ctx.system_time());
        let config = EngineConfig {
            tick_interval_ms: 500,
            ..Default::default()
        };
        let service = BroadcastService::start(Arc::clone(&ctx), config.clone(), audience()).unwrap();
        let b = service
            .create_broadcast(request(TargetSelector::All, Schedule::At(due)))
            .await
            .unwrap();
        sleep_secs(5.0).await;
        let snapshot = service.snapshot().await.unwrap();
        service.shutdown().await.unwrap();

        let restored = BroadcastService::restore(ctx, config, audience(), snapshot).unwrap();
        sleep_secs(5.0).await;

        let stats = restored.stats().await.unwrap();
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.completed, 0);
        assert_eq!(
            restored.get_broadcast(b.id).await.unwrap().unwrap().status,
            BroadcastStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_handle() {
        let ctx = TokioContext::shared();
        let service = BroadcastService::start(ctx, EngineConfig::default(), audience()).unwrap();
        service.shutdown().await.unwrap();

        let err = service
            .create_broadcast(request(TargetSelector::All, Schedule::Immediate))
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::Env(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_is_rejected() {
        let ctx = TokioContext::shared();
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            BroadcastService::start(ctx, config, audience()),
            Err(BroadcastError::Config(_))
        ));
    }
}
