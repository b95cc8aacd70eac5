//! Engine configuration.
//!
//! Every timing constant the engine uses lives here. Defaults are the
//! design values: a 15s scheduling tick, a 2s simulated send, and five drip
//! updates 4s apart that add at most 3% of the audience each and never push
//! opens past 80%.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::audience::StaticAudience;
use crate::error::ConfigError;
use crate::model::SegmentId;

/// Parameters of the post-completion "opened" growth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DripConfig {
    /// Delay between two drip updates
    pub interval_ms: u64,

    /// Maximum number of updates per broadcast
    pub max_updates: u32,

    /// Upper bound (exclusive) of one increment, in percent of the audience
    pub increment_percent: u32,

    /// Opened count never exceeds this percentage of the audience
    pub ceiling_percent: u32,
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            interval_ms: 4_000,
            max_updates: 5,
            increment_percent: 3,
            ceiling_percent: 80,
        }
    }
}

impl DripConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Configuration for the broadcast engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduling loop period
    pub tick_interval_ms: u64,

    /// Simulated processing time between `Sending` and `Completed`
    pub completion_delay_ms: u64,

    /// Opened count seeded at completion, in percent of the audience
    pub seed_open_percent: u32,

    /// Drip updater parameters
    pub drip: DripConfig,

    /// Capacity of the update notification channel
    pub update_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 15_000,
            completion_delay_ms: 2_000,
            seed_open_percent: 60,
            drip: DripConfig::default(),
            update_buffer: 256,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".into()));
        }
        if self.drip.interval_ms == 0 {
            return Err(ConfigError::Invalid("drip.interval_ms must be > 0".into()));
        }
        if self.drip.ceiling_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "drip.ceiling_percent {} exceeds 100",
                self.drip.ceiling_percent
            )));
        }
        if self.seed_open_percent > self.drip.ceiling_percent {
            return Err(ConfigError::Invalid(format!(
                "seed_open_percent {} exceeds drip.ceiling_percent {}",
                self.seed_open_percent, self.drip.ceiling_percent
            )));
        }
        if self.update_buffer == 0 {
            return Err(ConfigError::Invalid("update_buffer must be > 0".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }
}

/// Audience data the static resolver is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudienceConfig {
    /// Recipient count for `TargetSelector::All`
    pub total_users: u64,

    /// Recipient count per segment
    pub segments: BTreeMap<SegmentId, u64>,
}

impl AudienceConfig {
    /// Builds the resolver.
    pub fn build(&self) -> StaticAudience {
        StaticAudience::new(self.total_users).with_segments(self.segments.clone())
    }
}

/// `floor(value × percent / 100)` without going through floating point.
pub fn percent_of(value: u64, percent: u32) -> u64 {
    ((value as u128 * percent as u128) / 100) as u64
}
