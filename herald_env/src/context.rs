//! The `HeraldContext` trait.

use async_trait::async_trait;
use rand::rngs::StdRng;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// Everything the broadcast engine needs from the outside world.
///
/// Clocks, timers, task spawning and entropy all go through this trait, so
/// the same service code runs on tokio in production and on a virtual
/// clock in simulation.
///
/// | method        | `TokioContext`          | `SimContext`             |
/// |---------------|-------------------------|--------------------------|
/// | `now`         | tokio `Instant` elapsed | virtual clock            |
/// | `system_time` | start wall-clock + now  | fixed epoch + now        |
/// | `sleep`       | `tokio::time::sleep`    | advances the clock       |
/// | `derive_rng`  | OS entropy              | seed ⊕ stream            |
#[async_trait]
pub trait HeraldContext: Send + Sync + 'static {
    /// Monotonic time since the context was created.
    fn now(&self) -> Duration;

    /// Wall-clock time. `created_at`, `sent_at` and due-time checks use this.
    fn system_time(&self) -> SystemTime;

    async fn sleep(&self, duration: Duration);

    /// Runs `future` in the background under a task named `name`.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// RNG for one consumer, identified by `stream`.
    ///
    /// Seeded contexts must return the same sequence for the same
    /// `(seed, stream)` pair.
    fn derive_rng(&self, stream: u64) -> StdRng;

    /// Master seed, or 0 when the context draws from OS entropy.
    fn seed(&self) -> u64;
}
