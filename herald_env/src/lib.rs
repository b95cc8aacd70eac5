//! Herald Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the broadcast
//! engine to run in both **Production** (tokio) and **Simulation**
//! (virtual clock) environments.
//!
//! # Core Concept
//!
//! For deterministic simulation we intercept every source of
//! non-determinism the engine touches:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Randomness (`derive_rng()`)
//!
//! By deriving all entropy from a single 64-bit seed, any bug becomes
//! reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use herald_env::HeraldContext;
//!
//! async fn poll_loop<Ctx: HeraldContext>(ctx: &Ctx, interval: Duration) {
//!     loop {
//!         ctx.sleep(interval).await;
//!         tick(ctx.system_time());
//!     }
//! }
//! ```

mod context;
mod error;
mod tokio_impl;

pub use context::HeraldContext;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
