//! Broadcast scenarios for deterministic simulation.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: "All users" immediate send, completion and drip
    ImmediateSend,

    /// SIM-002: Segment broadcast scheduled a few seconds ahead
    ScheduledSegment,

    /// SIM-003: Many scheduling ticks around one due broadcast
    IdempotentDispatch,

    /// SIM-004: Drip growth against a ceiling it would otherwise exceed
    DripCeiling,

    /// SIM-005: Requests with empty selections are rejected
    InvalidSelector,

    /// SIM-006: Unknown segment fails when sending begins
    UnresolvableAudience,

    /// SIM-007: Draft saved, then submitted later
    DraftSubmission,

    /// SIM-008: Scheduling loop restarted after dispatch
    LoopRestart,

    /// SIM-009: Many broadcasts at random due times
    Burst,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::ImmediateSend,
            ScenarioId::ScheduledSegment,
            ScenarioId::IdempotentDispatch,
            ScenarioId::DripCeiling,
            ScenarioId::InvalidSelector,
            ScenarioId::UnresolvableAudience,
            ScenarioId::DraftSubmission,
            ScenarioId::LoopRestart,
            ScenarioId::Burst,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ImmediateSend => "immediate_send",
            ScenarioId::ScheduledSegment => "scheduled_segment",
            ScenarioId::IdempotentDispatch => "idempotent_dispatch",
            ScenarioId::DripCeiling => "drip_ceiling",
            ScenarioId::InvalidSelector => "invalid_selector",
            ScenarioId::UnresolvableAudience => "unresolvable_audience",
            ScenarioId::DraftSubmission => "draft_submission",
            ScenarioId::LoopRestart => "loop_restart",
            ScenarioId::Burst => "burst",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::ImmediateSend => "Send to all 5420 users now; 3252 opened at completion, drip capped at 80%",
            ScenarioId::ScheduledSegment => "Segment A (234) due in 5s; dispatched by the first tick, completed 2s later",
            ScenarioId::IdempotentDispatch => "Burst of ticks at the due instant; exactly one dispatch",
            ScenarioId::DripCeiling => "Seed rate above the drip step; opened count never passes the ceiling",
            ScenarioId::InvalidSelector => "Empty segment and user selections are rejected before storing",
            ScenarioId::UnresolvableAudience => "Unknown segment; broadcast fails when it enters sending",
            ScenarioId::DraftSubmission => "Draft stays put across ticks until submitted",
            ScenarioId::LoopRestart => "Fresh scheduling loop never re-dispatches a handled broadcast",
            ScenarioId::Burst => "40 broadcasts with random audiences and due times",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate_send" | "immediate" | "sim-001" => Ok(ScenarioId::ImmediateSend),
            "scheduled_segment" | "scheduled" | "sim-002" => Ok(ScenarioId::ScheduledSegment),
            "idempotent_dispatch" | "idempotent" | "sim-003" => Ok(ScenarioId::IdempotentDispatch),
            "drip_ceiling" | "drip" | "sim-004" => Ok(ScenarioId::DripCeiling),
            "invalid_selector" | "invalid" | "sim-005" => Ok(ScenarioId::InvalidSelector),
            "unresolvable_audience" | "unresolvable" | "sim-006" => Ok(ScenarioId::UnresolvableAudience),
            "draft_submission" | "draft" | "sim-007" => Ok(ScenarioId::DraftSubmission),
            "loop_restart" | "restart" | "sim-008" => Ok(ScenarioId::LoopRestart),
            "burst" | "sim-009" => Ok(ScenarioId::Burst),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("SIM-004".parse::<ScenarioId>(), Ok(ScenarioId::DripCeiling));
        assert_eq!("Draft".parse::<ScenarioId>(), Ok(ScenarioId::DraftSubmission));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
