//! Audience resolution.
//!
//! The engine only needs to know *how many* recipients a selector reaches.
//! Who those recipients are is the messaging platform's business.

use std::collections::BTreeMap;

use crate::error::AudienceError;
use crate::model::{SegmentId, TargetSelector};

/// Maps a targeting selector to a recipient count.
pub trait AudienceResolver: Send + Sync + 'static {
    fn resolve(&self, selector: &TargetSelector) -> Result<u64, AudienceError>;
}

/// Resolver over a fixed table of counts.
///
/// - `All` resolves to `total_users`
/// - `Segments` sums the known segment sizes (unknown segment is an error)
/// - `Users` counts the distinct ids
#[derive(Debug, Clone, Default)]
pub struct StaticAudience {
    total_users: u64,
    segments: BTreeMap<SegmentId, u64>,
}

impl StaticAudience {
    pub fn new(total_users: u64) -> Self {
        Self {
            total_users,
            segments: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) one segment.
    pub fn with_segment(mut self, id: impl Into<String>, count: u64) -> Self {
        self.segments.insert(SegmentId(id.into()), count);
        self
    }

    pub fn with_segments(mut self, segments: BTreeMap<SegmentId, u64>) -> Self {
        self.segments.extend(segments);
        self
    }
}

impl AudienceResolver for StaticAudience {
    fn resolve(&self, selector: &TargetSelector) -> Result<u64, AudienceError> {
        match selector {
            TargetSelector::All => Ok(self.total_users),
            TargetSelector::Segments(ids) => ids.iter().try_fold(0u64, |acc, id| {
                self.segments
                    .get(id)
                    .map(|count| acc.saturating_add(*count))
                    .ok_or_else(|| AudienceError::UnknownSegment(id.clone()))
            }),
            TargetSelector::Users(ids) => Ok(ids.len() as u64),
        }
    }
}

impl<F> AudienceResolver for F
where
    F: Fn(&TargetSelector) -> Result<u64, AudienceError> + Send + Sync + 'static,
{
    fn resolve(&self, selector: &TargetSelector) -> Result<u64, AudienceError> {
        self(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audience() -> StaticAudience {
        StaticAudience::new(5420)
            .with_segment("A", 234)
            .with_segment("B", 1000)
    }

    #[test]
    fn test_all_resolves_to_total() {
        assert_eq!(audience().resolve(&TargetSelector::All), Ok(5420));
    }

    #[test]
    fn test_segments_are_summed() {
        assert_eq!(audience().resolve(&TargetSelector::segments(["A"])), Ok(234));
        assert_eq!(audience().resolve(&TargetSelector::segments(["A", "B"])), Ok(1234));
    }

    #[test]
    fn test_unknown_segment_is_an_error() {
        let err = audience()
            .resolve(&TargetSelector::segments(["A", "ghost"]))
            .unwrap_err();
        assert_eq!(err, AudienceError::UnknownSegment(SegmentId::new("ghost")));
    }

    #[test]
    fn test_users_counts_distinct_ids() {
        let selector = TargetSelector::users(["u1", "u2", "u2", "u3"]);
        assert_eq!(audience().resolve(&selector), Ok(3));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |_: &TargetSelector| -> Result<u64, AudienceError> { Ok(42) };
        assert_eq!(resolver.resolve(&TargetSelector::All), Ok(42));
    }
}
