//! Folding of paginated change feeds into final entity maps.

use std::collections::{BTreeSet, HashMap};

use crate::segment::{Segment, SegmentChanges};
use crate::split::{Split, SplitChanges};

/// Applies split change pages in fetch order.
///
/// A split reported as archived is removed from the result even if an earlier page listed it
/// as active; otherwise the latest page to mention a split wins.
pub fn fold_splits<I>(pages: I) -> HashMap<String, Split>
where
    I: IntoIterator<Item = SplitChanges>,
{
    let mut splits = HashMap::new();
    for page in pages {
        for split in page.splits {
            if split.is_archived() {
                splits.remove(&split.name);
            } else {
                splits.insert(split.name.clone(), split);
            }
        }
    }
    splits
}

/// Applies the change pages of one segment in fetch order: each page's additions, then that
/// same page's removals.
///
/// `cursor` is where the feed ended and becomes both `since` and `till` of the result.
pub fn fold_segment<I>(name: &str, pages: I, cursor: i64) -> Segment
where
    I: IntoIterator<Item = SegmentChanges>,
{
    let mut members = BTreeSet::new();
    for page in pages {
        members.extend(page.added);
        for key in &page.removed {
            members.remove(key);
        }
    }
    Segment {
        name: name.to_string(),
        added: members.into_iter().collect(),
        removed: Vec::new(),
        since: cursor,
        till: cursor,
    }
}

/// Collects the segment names referenced by `splits`, along with how many splits reference at
/// least one segment.
pub fn segments_in_use<'a, I>(splits: I) -> (BTreeSet<String>, usize)
where
    I: IntoIterator<Item = &'a Split>,
{
    let mut names = BTreeSet::new();
    let mut using_segments_count = 0;
    for split in splits {
        let referenced = split.segment_names();
        if !referenced.is_empty() {
            using_segments_count += 1;
            names.extend(referenced.into_iter().map(str::to_string));
        }
    }
    (names, using_segments_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::Status;
    use proptest::collection::vec;
    use proptest::prelude::*;
    use spectral::prelude::*;

    fn split(name: &str) -> Split {
        serde_json::from_str(&format!(r#"{{"name": "{}"}}"#, name)).unwrap()
    }

    fn archived(name: &str) -> Split {
        split(name).with_status(Status::Archived)
    }

    fn split_page(since: i64, till: i64, splits: Vec<Split>) -> SplitChanges {
        SplitChanges {
            splits,
            since,
            till,
        }
    }

    fn segment_page(added: &[&str], removed: &[&str]) -> SegmentChanges {
        SegmentChanges {
            name: "mock-segment".into(),
            added: added.iter().map(|s| s.to_string()).collect(),
            removed: removed.iter().map(|s| s.to_string()).collect(),
            since: 0,
            till: 0,
        }
    }

    #[test]
    fn archived_split_is_removed_by_a_later_page() {
        let pages = vec![
            split_page(-1, 10, vec![split("mock-split-1"), split("mock-split-2")]),
            split_page(
                10,
                20,
                vec![
                    split("mock-split-1"),
                    archived("mock-split-2"),
                    split("mock-split-3"),
                    split("mock-split-4"),
                ],
            ),
        ];

        let splits = fold_splits(pages);

        assert_that!(splits).has_length(3);
        assert_that!(splits).does_not_contain_key("mock-split-2".to_string());
        assert_that!(splits).contains_key("mock-split-4".to_string());
    }

    #[test]
    fn later_page_replaces_earlier_definition() {
        let killed: Split =
            serde_json::from_str(r#"{"name": "mock-split-1", "killed": true}"#).unwrap();
        let pages = vec![
            split_page(-1, 10, vec![split("mock-split-1")]),
            split_page(10, 20, vec![killed.clone()]),
        ];

        let splits = fold_splits(pages);

        assert_that!(splits.get("mock-split-1")).contains_value(&killed);
    }

    #[test]
    fn split_reactivated_after_archive_is_live() {
        let pages = vec![
            split_page(-1, 10, vec![archived("mock-split-1")]),
            split_page(10, 20, vec![split("mock-split-1")]),
        ];
        assert_that!(fold_splits(pages)).contains_key("mock-split-1".to_string());
    }

    #[test]
    fn no_pages_yield_no_splits() {
        assert!(fold_splits(Vec::new()).is_empty());
    }

    #[test]
    fn segment_adds_then_removes_per_page() {
        let pages = vec![
            segment_page(&["A", "B", "C", "D"], &[]),
            segment_page(&["E"], &["B"]),
            segment_page(&[], &[]),
        ];

        let segment = fold_segment("mock-segment", pages, 40);

        assert_that!(segment.added).is_equal_to(vec![
            "A".to_string(),
            "C".to_string(),
            "D".to_string(),
            "E".to_string(),
        ]);
        assert_eq!(segment.since, 40);
        assert_eq!(segment.till, 40);
        assert_that!(segment.removed).is_empty();
    }

    #[test]
    fn key_added_and_removed_in_same_page_is_absent() {
        let segment = fold_segment("s", vec![segment_page(&["A"], &["A"])], 1);
        assert_that!(segment.added).is_empty();
    }

    #[test]
    fn empty_segment_feed_keeps_the_cursor() {
        let segment = fold_segment("s", Vec::new(), -1);
        assert_that!(segment.added).is_empty();
        assert_eq!(segment.till, -1);
    }

    #[test]
    fn counts_splits_not_references() {
        let splits = [
            Split::new_with_segment_match("a", vec!["employees", "beta"]),
            Split::new_with_segment_match("b", vec!["employees"]),
            split("c"),
        ];

        let (names, count) = segments_in_use(&splits);

        assert_eq!(count, 2);
        assert_that!(names.into_iter().collect::<Vec<_>>())
            .is_equal_to(vec!["beta".to_string(), "employees".to_string()]);
    }

    #[derive(Clone, Debug)]
    enum Change {
        Active(usize),
        Archived(usize),
    }

    fn change() -> impl Strategy<Value = Change> {
        prop_oneof![
            (0..6usize).prop_map(Change::Active),
            (0..6usize).prop_map(Change::Archived),
        ]
    }

    proptest! {
        #[test]
        fn last_change_decides_presence(pages in vec(vec(change(), 0..6), 0..6)) {
            let mut last = HashMap::new();
            let split_pages: Vec<SplitChanges> = pages
                .iter()
                .map(|changes| {
                    let splits = changes
                        .iter()
                        .map(|change| match change {
                            Change::Active(i) => {
                                last.insert(*i, true);
                                split(&format!("split-{}", i))
                            }
                            Change::Archived(i) => {
                                last.insert(*i, false);
                                archived(&format!("split-{}", i))
                            }
                        })
                        .collect();
                    split_page(0, 0, splits)
                })
                .collect();

            let splits = fold_splits(split_pages);

            for (i, live) in last {
                prop_assert_eq!(splits.contains_key(&format!("split-{}", i)), live);
            }
            prop_assert!(splits.values().all(|s| !s.is_archived()));
        }

        #[test]
        fn segment_matches_set_model(
            pages in vec((vec(0..8u8, 0..6), vec(0..8u8, 0..6)), 0..6)
        ) {
            let mut model = BTreeSet::new();
            let segment_pages: Vec<SegmentChanges> = pages
                .iter()
                .map(|(added, removed)| {
                    model.extend(added.iter().copied());
                    for key in removed {
                        model.remove(key);
                    }
                    SegmentChanges {
                        name: "s".into(),
                        added: added.iter().map(u8::to_string).collect(),
                        removed: removed.iter().map(u8::to_string).collect(),
                        since: 0,
                        till: 0,
                    }
                })
                .collect();

            let segment = fold_segment("s", segment_pages, 7);
            let expected: BTreeSet<String> = model.iter().map(u8::to_string).collect();

            prop_assert_eq!(segment.added.iter().cloned().collect::<BTreeSet<_>>(), expected);
        }
    }
}
