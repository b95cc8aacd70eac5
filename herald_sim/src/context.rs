//! Virtual-clock `HeraldContext` for simulation runs.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use herald_env::HeraldContext;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::Instrument;

/// Mixes the master seed before a stream id is folded in.
const STREAM_MIX: u64 = 0x517c_c1b7_2722_0a95;

/// Context whose clock only moves when the harness moves it.
///
/// Clones share one clock. Wall-clock time is `epoch + now()`, with the
/// epoch fixed at 2024-01-01T00:00:00Z so timestamps are stable across runs.
#[derive(Debug, Clone)]
pub struct SimContext {
    seed: u64,
    elapsed_ns: Arc<AtomicU64>,
    epoch: DateTime<Utc>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        let epoch = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH));
        Self {
            seed,
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            epoch,
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Moves the clock forward by `duration`.
    pub fn advance_time(&self, duration: Duration) {
        self.elapsed_ns.fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Moves the clock to `at`. The clock never runs backwards.
    pub fn set_time(&self, at: Duration) {
        self.elapsed_ns.fetch_max(at.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Wall-clock instant the virtual clock started at.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }
}

#[async_trait]
impl HeraldContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::from(self.epoch) + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("sim_task", name = %name, seed = self.seed);
        tokio::spawn(future.instrument(span));
    }

    fn derive_rng(&self, stream: u64) -> StdRng {
        let mut mixer = ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(STREAM_MIX) ^ stream);
        StdRng::seed_from_u64(mixer.next_u64())
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
