//! Herald Core - Broadcast Scheduling and Delivery-Simulation Engine
//!
//! This library holds the lifecycle of messaging campaigns ("broadcasts"):
//! 1. **Store**: the single source of truth for every broadcast
//! 2. **Scheduling Loop**: dispatches due scheduled broadcasts exactly once
//! 3. **Delivery Simulator**: the two-phase `Sending → Completed` send
//! 4. **Drip Updater**: bounded growth of the opened count after completion
//!
//! The [`engine`] is sans-IO; [`runtime`] runs it on a `HeraldContext`.

pub mod audience;
pub mod config;
pub mod delivery;
pub mod drip;
pub mod engine;
pub mod error;
pub mod model;
pub mod runtime;
pub mod scheduler;
pub mod store;

// Re-export key types for convenience
pub use audience::{AudienceResolver, StaticAudience};
pub use config::{AudienceConfig, DripConfig, EngineConfig};
pub use engine::{BroadcastEngine, EngineEvent, EngineStats, TimerRequest};
pub use error::{AudienceError, BroadcastError, ConfigError, ValidationError};
pub use model::{
    Broadcast, BroadcastId, BroadcastStatus, BroadcastUpdate, CreateBroadcast, MediaKind, MessageContent,
    Schedule, SegmentId, TargetSelector, UserId,
};
pub use runtime::{BroadcastService, ServiceHandle};
pub use scheduler::{DispatchGuard, SchedulingLoop};
pub use store::{BroadcastFilter, BroadcastStore, StoreSnapshot, StoreSummary};
