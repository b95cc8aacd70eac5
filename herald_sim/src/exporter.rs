//! JSON timeline exporter.
//!
//! Exports per-step broadcast state as JSON so a run can be inspected or
//! plotted after the fact.

use crate::oracle::Violation;

use herald_core::{Broadcast, BroadcastStore};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// State of every stored broadcast
    pub broadcasts: Vec<BroadcastFrame>,

    /// Events since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl TimelineFrame {
    /// Captures the store at `time_sec`.
    pub fn capture(time_sec: f64, store: &BroadcastStore) -> Self {
        let mut broadcasts: Vec<BroadcastFrame> = store.iter().map(BroadcastFrame::from).collect();
        broadcasts.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            time_sec,
            broadcasts,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: SimEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Broadcast state at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastFrame {
    pub id: String,
    pub status: String,
    pub audience: u64,
    pub delivered: u64,
    pub opened: u64,
}

impl From<&Broadcast> for BroadcastFrame {
    fn from(b: &Broadcast) -> Self {
        Self {
            id: b.id.to_string(),
            status: b.status.name().to_string(),
            audience: b.audience_count,
            delivered: b.delivered_count,
            opened: b.opened_count,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("error".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<TimelineFrame>,

    /// Final results
    pub passed: bool,

    /// Invariant violations seen during the run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl TimelineExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            violations: Vec::new(),
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: TimelineFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, violations: &[Violation]) {
        self.passed = passed;
        self.violations = violations.to_vec();
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_tracks_duration_and_serializes() {
        let store = BroadcastStore::new();
        let mut export = TimelineExport::new("burst", 7);
        export.add_frame(TimelineFrame::capture(0.5, &store));
        export.add_frame(TimelineFrame::capture(1.0, &store).with_event(SimEvent::info("tick")));
        export.finalize(true, &[]);

        assert_eq!(export.frames.len(), 2);
        assert_eq!(export.duration_sec, 1.0);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "burst");
        assert!(json.get("violations").is_none());
        assert!(json["frames"][0].get("events").is_none());
        assert_eq!(json["frames"][1]["events"][0]["message"], "tick");
    }
}
