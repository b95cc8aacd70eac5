//! In-memory broadcast store.
//!
//! The store is the single source of truth for every broadcast. Readers
//! (display, export) go through the public accessors; only the engine's
//! transition functions get mutable access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{Broadcast, BroadcastId, BroadcastStatus};

/// Read-only query over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastFilter {
    /// Case-insensitive substring matched against title and message text
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub status: Option<BroadcastStatus>,
}

impl BroadcastFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_status(mut self, status: BroadcastStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, broadcast: &Broadcast) -> bool {
        if let Some(status) = self.status {
            if broadcast.status != status {
                return false;
            }
        }
        match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                broadcast.title.to_lowercase().contains(&needle)
                    || broadcast.content.text.to_lowercase().contains(&needle)
            }
        }
    }
}

/// Aggregate counters across the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub total: usize,
    pub draft: usize,
    pub scheduled: usize,
    pub sending: usize,
    pub completed: usize,
    pub failed: usize,
    pub delivered: u64,
    pub opened: u64,
}

impl StoreSummary {
    /// Opened over delivered across all completed broadcasts.
    pub fn open_rate(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.opened as f64 / self.delivered as f64
        }
    }

    fn count(&mut self, status: BroadcastStatus) {
        let slot = match status {
            BroadcastStatus::Draft => &mut self.draft,
            BroadcastStatus::Scheduled => &mut self.scheduled,
            BroadcastStatus::Sending => &mut self.sending,
            BroadcastStatus::Completed => &mut self.completed,
            BroadcastStatus::Failed => &mut self.failed,
        };
        *slot += 1;
    }
}

/// Serializable image of the store, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub broadcasts: Vec<Broadcast>,
}

/// Broadcasts keyed by id, remembering insertion order.
#[derive(Debug, Default)]
pub struct BroadcastStore {
    broadcasts: HashMap<BroadcastId, Broadcast>,
    order: Vec<BroadcastId>,
}

impl BroadcastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a snapshot. Later duplicates of an id win.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut store = Self::new();
        for broadcast in snapshot.broadcasts {
            store.insert(broadcast);
        }
        store
    }

    pub(crate) fn insert(&mut self, broadcast: Broadcast) {
        let id = broadcast.id;
        if self.broadcasts.insert(id, broadcast).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &BroadcastId) -> Option<&Broadcast> {
        self.broadcasts.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &BroadcastId) -> Option<&mut Broadcast> {
        self.broadcasts.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.broadcasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty()
    }

    /// All broadcasts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Broadcast> {
        self.order.iter().filter_map(|id| self.broadcasts.get(id))
    }

    /// Ids of `Scheduled` broadcasts whose due time is at or before `now`.
    pub fn due_scheduled(&self, now: DateTime<Utc>) -> Vec<BroadcastId> {
        self.iter()
            .filter(|b| b.is_due(now))
            .map(|b| b.id)
            .collect()
    }

    /// Filtered view, newest first.
    pub fn list(&self, filter: &BroadcastFilter) -> Vec<Broadcast> {
        let mut out: Vec<Broadcast> = self.iter().filter(|b| filter.matches(b)).cloned().collect();
        // Reversed first so the stable sort keeps later inserts ahead on equal timestamps.
        out.reverse();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn summary(&self) -> StoreSummary {
        let mut summary = StoreSummary::default();
        for b in self.iter() {
            summary.total += 1;
            summary.count(b.status);
            summary.delivered += b.delivered_count;
            summary.opened += b.opened_count;
        }
        summary
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            broadcasts: self.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageContent, Schedule, TargetSelector};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn broadcast(seed: u64, title: &str, status: BroadcastStatus, created_offset: i64) -> Broadcast {
        Broadcast {
            id: BroadcastId::from_seed(seed),
            title: title.into(),
            target: TargetSelector::All,
            audience_count: 100,
            content: MessageContent::text(format!("body of {}", title)),
            schedule: Schedule::Immediate,
            status,
            delivered_count: 0,
            opened_count: 0,
            created_at: t0() + Duration::seconds(created_offset),
            sent_at: None,
            resolution_error: None,
            failure_reason: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = BroadcastStore::new();
        let b = broadcast(1, "Spring sale", BroadcastStatus::Draft, 0);
        store.insert(b.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&b.id), Some(&b));
        assert!(store.get(&BroadcastId::from_seed(99)).is_none());
    }

    #[test]
    fn test_due_scheduled_respects_time_and_status() {
        let mut store = BroadcastStore::new();

        let mut due = broadcast(1, "due", BroadcastStatus::Scheduled, 0);
        due.schedule = Schedule::At(t0() + Duration::seconds(10));
        let mut later = broadcast(2, "later", BroadcastStatus::Scheduled, 0);
        later.schedule = Schedule::At(t0() + Duration::seconds(60));
        let mut gone = broadcast(3, "gone", BroadcastStatus::Sending, 0);
        gone.schedule = Schedule::At(t0());

        store.insert(due.clone());
        store.insert(later);
        store.insert(gone);

        assert_eq!(store.due_scheduled(t0() + Duration::seconds(10)), vec![due.id]);
        assert!(store.due_scheduled(t0()).is_empty());
        assert_eq!(store.due_scheduled(t0() + Duration::seconds(60)).len(), 2);
    }

    #[test]
    fn test_list_filters_and_orders_newest_first() {
        let mut store = BroadcastStore::new();
        store.insert(broadcast(1, "Spring sale", BroadcastStatus::Completed, 0));
        store.insert(broadcast(2, "Summer SALE", BroadcastStatus::Scheduled, 10));
        store.insert(broadcast(3, "Newsletter", BroadcastStatus::Completed, 20));

        let all = store.list(&BroadcastFilter::all());
        let titles: Vec<_> = all.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Newsletter", "Summer SALE", "Spring sale"]);

        let sales = store.list(&BroadcastFilter::all().with_text("sale"));
        assert_eq!(sales.len(), 2);

        let completed_sales = store.list(
            &BroadcastFilter::all()
                .with_text("sale")
                .with_status(BroadcastStatus::Completed),
        );
        assert_eq!(completed_sales.len(), 1);
        assert_eq!(completed_sales[0].title, "Spring sale");

        // Message text is searched too
        assert_eq!(store.list(&BroadcastFilter::all().with_text("body of news")).len(), 1);
    }

    #[test]
    fn test_blank_text_filter_matches_everything() {
        let mut store = BroadcastStore::new();
        store.insert(broadcast(1, "a", BroadcastStatus::Draft, 0));
        assert_eq!(store.list(&BroadcastFilter::all().with_text("  ")).len(), 1);
    }

    #[test]
    fn test_summary() {
        let mut store = BroadcastStore::new();
        let mut done = broadcast(1, "done", BroadcastStatus::Completed, 0);
        done.delivered_count = 100;
        done.opened_count = 70;
        store.insert(done);
        store.insert(broadcast(2, "failed", BroadcastStatus::Failed, 0));
        store.insert(broadcast(3, "draft", BroadcastStatus::Draft, 0));

        let summary = store.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.draft, 1);
        assert_eq!(summary.delivered, 100);
        assert_relative_eq!(summary.open_rate(), 0.7);
    }

    #[test]
    fn test_snapshot_restores_order_and_state() {
        let mut store = BroadcastStore::new();
        for i in 0..5 {
            store.insert(broadcast(i, &format!("b{}", i), BroadcastStatus::Draft, i as i64));
        }
        let snapshot = store.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = BroadcastStore::from_snapshot(serde_json::from_str(&json).unwrap());

        let before: Vec<_> = store.iter().map(|b| b.id).collect();
        let after: Vec<_> = restored.iter().map(|b| b.id).collect();
        assert_eq!(before, after);
    }
}
