use std::collections::HashMap;

use crate::segment::Segment;
use crate::split::Split;
use crate::store::{FetchedSegments, FetchedSplits};

/// A point-in-time view of every live split and the segments they reference.
///
/// A snapshot is immutable once built; each refresh builds a new one. [Snapshot::empty] is
/// distinct from a snapshot that was fetched successfully but holds no splits: only the former
/// renders as [crate::EMPTY_CACHE_MARKER].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    splits: HashMap<String, Split>,
    since: i64,
    segments: HashMap<String, Segment>,
    using_segments_count: usize,
    populated: bool,
}

impl Snapshot {
    /// The snapshot held before any refresh has succeeded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(splits: FetchedSplits, segments: FetchedSegments) -> Self {
        Self {
            splits: splits.splits,
            since: splits.since,
            segments: segments.segments,
            using_segments_count: segments.using_segments_count,
            populated: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.populated
    }

    pub fn splits(&self) -> &HashMap<String, Split> {
        &self.splits
    }

    pub fn split(&self, name: &str) -> Option<&Split> {
        self.splits.get(name)
    }

    pub fn since(&self) -> i64 {
        self.since
    }

    pub fn segments(&self) -> &HashMap<String, Segment> {
        &self.segments
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.get(name)
    }

    pub fn using_segments_count(&self) -> usize {
        self.using_segments_count
    }
}
