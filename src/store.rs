use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::segment::Segment;
use crate::split::Split;

/// Every live split from a complete walk of the split change feed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchedSplits {
    /// Live splits keyed by name. Archived splits are never present.
    pub splits: HashMap<String, Split>,
    /// The `till` of the last page fetched.
    pub since: i64,
}

/// The segments referenced by a set of splits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchedSegments {
    pub segments: HashMap<String, Segment>,
    /// How many of the splits reference at least one segment.
    pub using_segments_count: usize,
}

/// ChangeFetcher is the interface to the remote feature flag service.
///
/// Implementations page through the change feed internally until it is exhausted and hand back
/// either a complete result or the first error they hit; partial results never cross this
/// boundary. [crate::SplitioBinding] is the HTTP implementation.
#[async_trait]
pub trait ChangeFetcher: Send + Sync {
    /// Retrieve every live split.
    async fn fetch_splits(&self) -> Result<FetchedSplits>;

    /// Retrieve the segments that `splits` reference through `IN_SEGMENT` matchers.
    async fn fetch_segments_for_splits(
        &self,
        splits: &HashMap<String, Split>,
    ) -> Result<FetchedSegments>;
}
