//! Broadcast data model.
//!
//! A [`Broadcast`] is one outbound message campaign. Everything the operator
//! chooses at creation time (title, targeting, content, schedule) is
//! immutable afterwards; only `status`, the counters and `sent_at` move,
//! and only through the engine's transition functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::error::BroadcastError;

/// Unique identifier for a broadcast.
///
/// Built from engine RNG bytes, so seeded runs reproduce the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BroadcastId(pub Uuid);

impl BroadcastId {
    /// Creates a deterministic BroadcastId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Identifier of an audience segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Who a broadcast goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "ids", rename_all = "snake_case")]
pub enum TargetSelector {
    All,
    Segments(BTreeSet<SegmentId>),
    Users(BTreeSet<UserId>),
}

impl TargetSelector {
    /// Convenience constructor for a segment selection.
    pub fn segments<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Segments(ids.into_iter().map(|s| SegmentId(s.into())).collect())
    }

    /// Convenience constructor for an explicit user list.
    pub fn users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Users(ids.into_iter().map(|s| UserId(s.into())).collect())
    }

    /// True when a `Segments`/`Users` selector names nobody.
    pub fn is_empty_selection(&self) -> bool {
        match self {
            TargetSelector::All => false,
            TargetSelector::Segments(ids) => ids.is_empty(),
            TargetSelector::Users(ids) => ids.is_empty(),
        }
    }

    /// Short label for logs.
    pub fn mode(&self) -> &'static str {
        match self {
            TargetSelector::All => "all",
            TargetSelector::Segments(_) => "segments",
            TargetSelector::Users(_) => "users",
        }
    }
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

/// A single media reference. Upload and hosting are someone else's problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: String,
}

/// Message payload: text plus at most one media reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl MessageContent {
    /// Text-only content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
        }
    }

    /// Attaches a media reference.
    pub fn with_media(mut self, kind: MediaKind, url: impl Into<String>) -> Self {
        self.media = Some(MediaRef {
            kind,
            url: url.into(),
        });
        self
    }

    /// Content counts as empty when there is neither text nor media.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.media.is_none()
    }
}

/// When a broadcast should go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Schedule {
    Immediate,
    At(DateTime<Utc>),
}

impl Schedule {
    /// The due instant, if any.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Immediate => None,
            Schedule::At(t) => Some(*t),
        }
    }
}

/// Broadcast lifecycle state.
///
/// ```text
/// Draft ──► Scheduled ──► Sending ──► Completed
///   │                       │
///   └──────────────────────►├──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
}

impl BroadcastStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [BroadcastStatus; 5] = [
        BroadcastStatus::Draft,
        BroadcastStatus::Scheduled,
        BroadcastStatus::Sending,
        BroadcastStatus::Completed,
        BroadcastStatus::Failed,
    ];

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: BroadcastStatus) -> bool {
        use BroadcastStatus::*;
        matches!(
            (self, next),
            (Draft, Sending)
                | (Draft, Scheduled)
                | (Scheduled, Sending)
                | (Sending, Completed)
                | (Sending, Failed)
        )
    }

    /// `Completed` and `Failed` are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, BroadcastStatus::Completed | BroadcastStatus::Failed)
    }

    /// Position in the lifecycle; a transition always increases it.
    pub fn rank(self) -> u8 {
        match self {
            BroadcastStatus::Draft => 0,
            BroadcastStatus::Scheduled => 1,
            BroadcastStatus::Sending => 2,
            BroadcastStatus::Completed | BroadcastStatus::Failed => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BroadcastStatus::Draft => "draft",
            BroadcastStatus::Scheduled => "scheduled",
            BroadcastStatus::Sending => "sending",
            BroadcastStatus::Completed => "completed",
            BroadcastStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BroadcastStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(BroadcastStatus::Draft),
            "scheduled" => Ok(BroadcastStatus::Scheduled),
            "sending" => Ok(BroadcastStatus::Sending),
            "completed" => Ok(BroadcastStatus::Completed),
            "failed" => Ok(BroadcastStatus::Failed),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// What the operator asks for when creating a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBroadcast {
    pub title: String,
    pub target: TargetSelector,
    pub content: MessageContent,
    pub schedule: Schedule,
    /// Store as `Draft` instead of submitting right away
    #[serde(default)]
    pub save_as_draft: bool,
}

impl CreateBroadcast {
    /// A request that is submitted immediately with the given schedule.
    pub fn new(
        title: impl Into<String>,
        target: TargetSelector,
        content: MessageContent,
        schedule: Schedule,
    ) -> Self {
        Self {
            title: title.into(),
            target,
            content,
            schedule,
            save_as_draft: false,
        }
    }

    /// Marks the request as a draft.
    pub fn as_draft(mut self) -> Self {
        self.save_as_draft = true;
        self
    }
}

/// One outbound message campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: BroadcastId,
    pub title: String,
    pub target: TargetSelector,
    /// Resolved once at creation; ceiling for every counter
    pub audience_count: u64,
    pub content: MessageContent,
    pub schedule: Schedule,
    pub status: BroadcastStatus,
    pub delivered_count: u64,
    pub opened_count: u64,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Audience resolution failure recorded at creation, acted on at dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Broadcast {
    /// Moves to `next`, refusing anything that is not a state-machine edge.
    pub(crate) fn transition(&mut self, next: BroadcastStatus) -> Result<(), BroadcastError> {
        if !self.status.can_transition_to(next) {
            return Err(BroadcastError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Scheduled and due at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == BroadcastStatus::Scheduled
            && self.schedule.due_at().map_or(false, |t| t <= now)
    }

    /// Fraction of delivered messages that were opened.
    pub fn open_rate(&self) -> f64 {
        if self.delivered_count == 0 {
            0.0
        } else {
            self.opened_count as f64 / self.delivered_count as f64
        }
    }

    /// `opened ≤ delivered ≤ audience`.
    pub fn counters_consistent(&self) -> bool {
        self.opened_count <= self.delivered_count && self.delivered_count <= self.audience_count
    }
}

/// Counter snapshot pushed to passive readers whenever a broadcast changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastUpdate {
    pub id: BroadcastId,
    pub status: BroadcastStatus,
    pub delivered_count: u64,
    pub opened_count: u64,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<&Broadcast> for BroadcastUpdate {
    fn from(b: &Broadcast) -> Self {
        Self {
            id: b.id,
            status: b.status,
            delivered_count: b.delivered_count,
            opened_count: b.opened_count,
            sent_at: b.sent_at,
        }
    }
}
