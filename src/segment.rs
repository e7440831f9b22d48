use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

/// One page of the change feed for a single segment.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentChanges {
    #[serde(default)]
    pub name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub added: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub removed: Vec<String>,
    pub since: i64,
    pub till: i64,
}

/// A segment folded from all of its change pages.
///
/// `added` holds the surviving member keys in sorted order. `since` and `till` are both the
/// cursor the fold ended at, and `removed` is always empty: removals have already been applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub name: String,
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    pub since: i64,
    pub till: i64,
}

impl Segment {
    pub fn contains(&self, key: &str) -> bool {
        self.added.binary_search_by(|k| k.as_str().cmp(key)).is_ok()
    }

    pub fn len(&self) -> usize {
        self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}
