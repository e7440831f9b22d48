use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Matcher type of a condition that targets members of a segment.
pub const IN_SEGMENT_MATCHER: &str = "IN_SEGMENT";

/// A feature flag definition as delivered by the split change feed.
///
/// Only the fields this crate acts on are typed. Everything else (treatments, traffic
/// allocation, configurations, ...) is carried in `payload` so that it is serialized back out
/// exactly as it was received.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    pub name: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    status: Option<Option<Status>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    conditions: Option<Option<Vec<Condition>>>,

    #[serde(flatten)]
    payload: Map<String, Value>,
}

/// One page of the split change feed.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SplitChanges {
    #[serde(default)]
    pub splits: Vec<Split>,
    pub since: i64,
    pub till: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Active,
    Archived,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    matcher_group: Option<Option<MatcherGroup>>,

    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherGroup {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    matchers: Option<Option<Vec<Matcher>>>,

    #[serde(flatten)]
    payload: Map<String, Value>,
}

// Matchers stay almost entirely untyped: the feed sends explicit nulls for the data blocks a
// matcher type does not use, and those must survive re-serialization. Typed fields tell absent
// apart from null for the same reason.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    matcher_type: Option<Option<String>>,

    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl Split {
    pub fn status(&self) -> Status {
        self.status.flatten().unwrap_or_default()
    }

    pub fn is_archived(&self) -> bool {
        self.status() == Status::Archived
    }

    pub fn conditions(&self) -> &[Condition] {
        self.conditions
            .as_ref()
            .and_then(|conditions| conditions.as_deref())
            .unwrap_or_default()
    }

    /// Names of every segment referenced by an `IN_SEGMENT` matcher in this split's conditions.
    pub fn segment_names(&self) -> BTreeSet<&str> {
        self.conditions()
            .iter()
            .filter_map(Condition::matcher_group)
            .flat_map(|group| group.matchers().iter())
            .filter_map(Matcher::segment_name)
            .collect()
    }

    #[cfg(test)]
    pub fn new_with_segment_match(name: &str, segment_names: Vec<&str>) -> Self {
        let matchers: Vec<Value> = segment_names
            .into_iter()
            .map(|segment_name| {
                serde_json::json!({
                    "matcherType": IN_SEGMENT_MATCHER,
                    "userDefinedSegmentMatcherData": {"segmentName": segment_name},
                    "whitelistMatcherData": null,
                    "negate": false
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "name": name,
            "status": "ACTIVE",
            "killed": false,
            "defaultTreatment": "off",
            "conditions": [{
                "conditionType": "ROLLOUT",
                "matcherGroup": {"combiner": "AND", "matchers": matchers},
                "partitions": [{"treatment": "on", "size": 100}],
                "label": "in segment"
            }]
        }))
        .expect("valid split fixture")
    }

    #[cfg(test)]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(Some(status));
        self
    }
}

impl Condition {
    pub fn matcher_group(&self) -> Option<&MatcherGroup> {
        self.matcher_group.as_ref().and_then(Option::as_ref)
    }
}

impl MatcherGroup {
    pub fn matchers(&self) -> &[Matcher] {
        self.matchers
            .as_ref()
            .and_then(|matchers| matchers.as_deref())
            .unwrap_or_default()
    }
}

impl Matcher {
    /// The segment this matcher targets, if it is an `IN_SEGMENT` matcher naming one.
    pub fn segment_name(&self) -> Option<&str> {
        if self.matcher_type.as_ref().and_then(Option::as_deref) != Some(IN_SEGMENT_MATCHER) {
            return None;
        }
        self.payload
            .get("userDefinedSegmentMatcherData")?
            .get("segmentName")?
            .as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    const MOCK_CONDITIONS: &str = r#"[
        {
          "conditionType": "foo",
          "matcherGroup": {
            "matchers": [
              {
                "matcherType": "WHITELIST"
              }
            ]
          }
        },
        {
          "conditionType": "bar",
          "matcherGroup": {
            "matchers": [
              {
                "matcherType": "IN_SEGMENT",
                "userDefinedSegmentMatcherData": {
                  "segmentName": "mock-segment"
                }
              }
            ]
          }
        }
    ]"#;

    #[test]
    fn finds_segments_referenced_by_in_segment_matchers() {
        let json = format!(
            r#"{{"name": "mock-split-1", "conditions": {}}}"#,
            MOCK_CONDITIONS
        );
        let split: Split = serde_json::from_str(&json).unwrap();

        assert_that!(split.segment_names().into_iter().collect::<Vec<_>>())
            .is_equal_to(vec!["mock-segment"]);
    }

    #[test]
    fn split_without_conditions_uses_no_segments() {
        let split: Split = serde_json::from_str(r#"{"name": "mock-split-2"}"#).unwrap();
        assert!(split.segment_names().is_empty());
        assert!(split.conditions().is_empty());
    }

    #[test]
    fn segment_names_are_deduplicated() {
        let split =
            Split::new_with_segment_match("split", vec!["beta", "alpha", "beta"]);
        assert_that!(split.segment_names().into_iter().collect::<Vec<_>>())
            .is_equal_to(vec!["alpha", "beta"]);
    }

    #[test]
    fn matcher_needs_in_segment_type_to_name_a_segment() {
        let matcher: Matcher = serde_json::from_value(json!({
            "matcherType": "WHITELIST",
            "userDefinedSegmentMatcherData": {"segmentName": "not-a-segment-ref"}
        }))
        .unwrap();
        assert_that!(matcher.segment_name()).is_none();
    }

    #[test_case(r#"{"name": "s"}"#, Status::Active)]
    #[test_case(r#"{"name": "s", "status": "ACTIVE"}"#, Status::Active)]
    #[test_case(r#"{"name": "s", "status": "ARCHIVED"}"#, Status::Archived)]
    fn decodes_status(json: &str, expected: Status) {
        let split: Split = serde_json::from_str(json).unwrap();
        assert_eq!(split.status(), expected);
        assert_eq!(split.is_archived(), expected == Status::Archived);
    }

    #[test]
    fn unknown_fields_round_trip_unchanged() {
        let original = json!({
            "name": "mock-split-1",
            "trafficTypeName": "user",
            "trafficAllocation": 100,
            "trafficAllocationSeed": -1_364_119_282,
            "seed": -605_938_843,
            "status": "ACTIVE",
            "killed": false,
            "defaultTreatment": "off",
            "changeNumber": 1_660_326_991_072_i64,
            "algo": 2,
            "configurations": {"on": "{\"color\": \"blue\"}"},
            "conditions": [{
                "conditionType": "WHITELIST",
                "matcherGroup": {
                    "combiner": "AND",
                    "matchers": [{
                        "keySelector": null,
                        "matcherType": "IN_SEGMENT",
                        "negate": false,
                        "userDefinedSegmentMatcherData": {"segmentName": "employees"},
                        "whitelistMatcherData": null
                    }]
                },
                "partitions": [{"treatment": "on", "size": 100}],
                "label": "whitelisted segment"
            }]
        });

        let split: Split = serde_json::from_value(original.clone()).unwrap();
        assert_json_eq!(serde_json::to_value(&split).unwrap(), original);
    }

    #[test_case(json!({"name": "s", "status": null, "conditions": null}); "null typed fields")]
    #[test_case(json!({"name": "s", "conditions": [{"matcherGroup": null}]}); "null matcher group")]
    #[test_case(json!({"name": "s", "conditions": [{"matcherGroup": {"combiner": "AND"}}]}); "group without matchers")]
    #[test_case(json!({"name": "s", "conditions": [{"matcherGroup": {"matchers": null}}]}); "null matchers")]
    #[test_case(json!({"name": "s", "conditions": [{"matcherGroup": {"matchers": [{"negate": true}]}}]}); "matcher without type")]
    #[test_case(json!({"name": "s", "conditions": [{"matcherGroup": {"matchers": [{"matcherType": null}]}}]}); "null matcher type")]
    fn absent_and_null_fields_round_trip_unchanged(original: Value) {
        let split: Split = serde_json::from_value(original.clone()).unwrap();

        assert_json_eq!(serde_json::to_value(&split).unwrap(), original);
        assert_eq!(split.status(), Status::Active);
        assert!(split.segment_names().is_empty());
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        assert!(serde_json::from_str::<Split>(r#"{"name": "s", "status": "DELETED"}"#).is_err());
    }
}
