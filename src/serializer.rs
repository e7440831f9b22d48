//! Rendering of snapshots into the script block embedded in server-rendered pages.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::warn;
use serde::Serialize;

use crate::snapshot::Snapshot;
use crate::split::Split;
use crate::store::{ChangeFetcher, FetchedSegments};
use crate::util::normalize_names;

/// Rendered in place of a payload when no snapshot has been built yet or a render failed.
pub const EMPTY_CACHE_MARKER: &str = "<script>window.__splitCachePreload = {}</script>";

/// Renders the preload script for a snapshot or a named subset of it.
///
/// Rendering the whole snapshot is pure. Rendering a subset re-fetches the segments used by
/// just that subset when segment serialization is enabled, which is why it needs a fetcher.
pub struct Serializer {
    fetcher: Arc<dyn ChangeFetcher>,
    serialize_segments: bool,
}

impl Serializer {
    pub fn new(fetcher: Arc<dyn ChangeFetcher>, serialize_segments: bool) -> Self {
        Self {
            fetcher,
            serialize_segments,
        }
    }

    pub fn serialize_segments(&self) -> bool {
        self.serialize_segments
    }

    /// Renders every split in `snapshot` along with the snapshot's own segments.
    pub fn render_all(&self, snapshot: &Snapshot) -> String {
        if snapshot.is_empty() {
            return EMPTY_CACHE_MARKER.to_string();
        }
        preload_script(
            &encode_entities(snapshot.splits()),
            snapshot.since(),
            &encode_entities(snapshot.segments()),
            snapshot.using_segments_count(),
        )
    }

    /// Renders the splits of `snapshot` named in `names`, or all of them if `names` is empty.
    ///
    /// Names without a matching split are skipped. If re-fetching the subset's segments fails
    /// the whole render degrades to [EMPTY_CACHE_MARKER].
    pub async fn render(&self, snapshot: &Snapshot, names: &[String]) -> String {
        if snapshot.is_empty() {
            return EMPTY_CACHE_MARKER.to_string();
        }
        let names = normalize_names(names);
        if names.is_empty() {
            return self.render_all(snapshot);
        }

        let selected: HashMap<String, Split> = snapshot
            .splits()
            .iter()
            .filter(|(name, _)| names.binary_search(*name).is_ok())
            .map(|(name, split)| (name.clone(), split.clone()))
            .collect();

        let segments = if self.serialize_segments && !selected.is_empty() {
            match self.fetcher.fetch_segments_for_splits(&selected).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(
                        "failed to fetch segments for splits [{}]: {}",
                        names.join(", "),
                        e
                    );
                    return EMPTY_CACHE_MARKER.to_string();
                }
            }
        } else {
            FetchedSegments::default()
        };

        preload_script(
            &encode_entities(&selected),
            snapshot.since(),
            &encode_entities(&segments.segments),
            segments.using_segments_count,
        )
    }
}

/// Fills in the preload script template.
pub fn preload_script(
    splits_data: &str,
    since: i64,
    segments_data: &str,
    using_segments_count: usize,
) -> String {
    format!(
        "<script>window.__splitCachePreload = {{ splitsData: {}, since: {}, segmentsData: {}, usingSegmentsCount: {} }}</script>",
        splits_data, since, segments_data, using_segments_count
    )
}

// Encodes each entity to a JSON string, then encodes the name -> string map itself, so every
// value in the result is a string holding JSON. Entities that fail to encode are left out.
fn encode_entities<T: Serialize>(entities: &HashMap<String, T>) -> String {
    let encoded: BTreeMap<&str, String> = entities
        .iter()
        .filter_map(|(name, entity)| match serde_json::to_string(entity) {
            Ok(json) => Some((name.as_str(), json)),
            Err(e) => {
                warn!("skipping {} in preload payload: {}", name, e);
                None
            }
        })
        .collect();
    serde_json::to_string(&encoded).unwrap_or_else(|e| {
        warn!("failed to encode preload payload: {}", e);
        "{}".to_string()
    })
}
