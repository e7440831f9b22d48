use itertools::Itertools;
use serde_json::Value;

use crate::error::{Error, Result};

/// Separator between names in a subset label.
pub const SUBSET_KEY_DELIMITER: &str = ".";

/// Reads a page cursor out of a decoded JSON value.
///
/// Cursors are change numbers, so anything but an integer (a float such as `3.15`, a string,
/// a missing field) is rejected rather than truncated.
pub(crate) fn cursor_from_value(value: Option<&Value>) -> Result<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| Error::Cursor {
            value: n.to_string(),
        }),
        Some(other) => Err(Error::Cursor {
            value: other.to_string(),
        }),
        None => Err(Error::Cursor {
            value: "null".to_string(),
        }),
    }
}

/// Sorts and deduplicates `names`, which is the order the serializer expects for its binary
/// search membership test.
pub(crate) fn normalize_names(names: &[String]) -> Vec<String> {
    names.iter().sorted().dedup().cloned().collect()
}

/// A readable label for a subset of names, as used in log lines.
///
/// Distinct name lists can share a label (`["a.b"]` and `["a", "b"]`), so memoized views are
/// keyed by the normalized names themselves instead.
pub fn subset_key(names: &[String]) -> String {
    normalize_names(names).join(SUBSET_KEY_DELIMITER)
}
