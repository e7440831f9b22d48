#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use maplit::hashmap;
use reqwest::StatusCode;

use crate::error::{Error, Result};
use crate::reducer::segments_in_use;
use crate::segment::Segment;
use crate::snapshot::Snapshot;
use crate::split::Split;
use crate::store::{ChangeFetcher, FetchedSegments, FetchedSplits};

pub fn mock_splits() -> HashMap<String, Split> {
    hashmap! {
        "mock-split-1".to_string() => Split::new_with_segment_match("mock-split-1", vec!["mock-segment-1"]),
        "mock-split-2".to_string() => Split::new_with_segment_match("mock-split-2", vec!["mock-segment-2"]),
        "mock-split-3".to_string() => serde_json::from_str(r#"{
                "name": "mock-split-3",
                "status": "ACTIVE",
                "killed": false,
                "defaultTreatment": "off",
                "conditions": []
            }"#).unwrap(),
    }
}

pub fn mock_segments() -> HashMap<String, Segment> {
    hashmap! {
        "mock-segment-1".to_string() => Segment {
            name: "mock-segment-1".into(),
            added: vec!["bar".into(), "foo".into()],
            removed: vec![],
            since: 20,
            till: 20,
        },
        "mock-segment-2".to_string() => Segment {
            name: "mock-segment-2".into(),
            added: vec!["baz".into()],
            removed: vec![],
            since: 30,
            till: 30,
        },
    }
}

/// A snapshot holding [mock_splits] and [mock_segments] at cursor 20.
pub fn mock_snapshot() -> Snapshot {
    let splits = mock_splits();
    let (_, using_segments_count) = segments_in_use(splits.values());
    Snapshot::new(
        FetchedSplits { splits, since: 20 },
        FetchedSegments {
            segments: mock_segments(),
            using_segments_count,
        },
    )
}

/// A fetcher serving [mock_splits] whose cursor advances by one on every split fetch.
pub struct MockFetcher {
    splits: Mutex<HashMap<String, Split>>,
    since: AtomicI64,
    fail_splits: AtomicBool,
    fail_segments: AtomicBool,
    split_fetches: AtomicUsize,
    segment_fetches: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            splits: Mutex::new(mock_splits()),
            since: AtomicI64::new(0),
            fail_splits: AtomicBool::new(false),
            fail_segments: AtomicBool::new(false),
            split_fetches: AtomicUsize::new(0),
            segment_fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_splits(&self, splits: HashMap<String, Split>) {
        *self.splits.lock().unwrap() = splits;
    }

    pub fn fail_splits(&self, fail: bool) {
        self.fail_splits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_segments(&self, fail: bool) {
        self.fail_segments.store(fail, Ordering::SeqCst);
    }

    pub fn split_fetches(&self) -> usize {
        self.split_fetches.load(Ordering::SeqCst)
    }

    pub fn segment_fetches(&self) -> usize {
        self.segment_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeFetcher for MockFetcher {
    async fn fetch_splits(&self) -> Result<FetchedSplits> {
        self.split_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_splits.load(Ordering::SeqCst) {
            return Err(Error::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        let since = self.since.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FetchedSplits {
            splits: self.splits.lock().unwrap().clone(),
            since,
        })
    }

    async fn fetch_segments_for_splits(
        &self,
        splits: &HashMap<String, Split>,
    ) -> Result<FetchedSegments> {
        self.segment_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_segments.load(Ordering::SeqCst) {
            return Err(Error::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        let (names, using_segments_count) = segments_in_use(splits.values());
        let all = mock_segments();
        let segments = names
            .into_iter()
            .filter_map(|name| all.get(&name).map(|s| (name, s.clone())))
            .collect();
        Ok(FetchedSegments {
            segments,
            using_segments_count,
        })
    }
}
