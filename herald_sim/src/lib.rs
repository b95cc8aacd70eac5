//! Herald Deterministic Simulation Harness
//!
//! This crate runs the broadcast engine inside a controlled environment
//! where every run is reproducible from a single seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock that only moves when the world steps
//! - **Timers**: a priority queue ordered by virtual due time
//! - **Randomness**: all entropy derived from one 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       SimWorld                       │
//! │  ┌────────────────┐        ┌──────────────────────┐  │
//! │  │ SchedulingLoop │──────► │   BroadcastEngine    │  │
//! │  └────────────────┘ events └──────────┬───────────┘  │
//! │          ▲                            │ timers       │
//! │          │ ticks       ┌──────────────▼───────────┐  │
//! │          └──────────── │ Virtual clock + queue    │  │
//! │                        └──────────────────────────┘  │
//! │                ┌──────────────────────┐              │
//! │                │   InvariantOracle    │              │
//! │                └──────────────────────┘              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use herald_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::ScheduledSegment);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;
mod world;

pub use context::SimContext;
pub use exporter::{BroadcastFrame, SimEvent, TimelineExport, TimelineFrame};
pub use oracle::{InvariantOracle, Violation};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimWorld};
