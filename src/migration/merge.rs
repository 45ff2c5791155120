//! Merging old-shape data into data already in the new location

use crate::annotations::{ConversationTimeRecord, Family};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Identity field of an array entry. Older generations used `id`.
fn entry_key(entry: &Value) -> Option<&str> {
    entry
        .get("key")
        .or_else(|| entry.get("id"))
        .and_then(Value::as_str)
}

/// Merge the value stored under `storage_key` with data arriving from an
/// older location.
///
/// Conversation time maps are merged per conversation so write-once fields
/// survive; everything else goes through [`merge_preferring_existing`].
pub fn merge_stored(storage_key: &str, existing: Value, incoming: Value) -> Value {
    if storage_key == Family::Timestamps.storage_key() {
        if let Some(merged) = merge_conversation_times(&existing, &incoming) {
            return merged;
        }
    }
    merge_preferring_existing(existing, incoming)
}

type TimeMap = BTreeMap<String, ConversationTimeRecord>;

fn merge_conversation_times(existing: &Value, incoming: &Value) -> Option<Value> {
    let mut kept: TimeMap = serde_json::from_value(existing.clone()).ok()?;
    let arriving: TimeMap = serde_json::from_value(incoming.clone()).ok()?;
    for (url, record) in arriving {
        match kept.get_mut(&url) {
            Some(current) => current.absorb(record),
            None => {
                kept.insert(url, record);
            }
        }
    }
    serde_json::to_value(kept).ok()
}

/// Merge `incoming` into `existing`; entries already present in `existing`
/// win.
///
/// Arrays are unioned by entry key (entries without a key are appended),
/// objects by property name. Any other combination keeps `existing`.
pub fn merge_preferring_existing(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Array(mut kept), Value::Array(new)) => {
            let present: HashSet<String> = kept
                .iter()
                .filter_map(entry_key)
                .map(str::to_string)
                .collect();
            for entry in new {
                match entry_key(&entry) {
                    Some(key) if present.contains(key) => {}
                    _ => kept.push(entry),
                }
            }
            Value::Array(kept)
        }
        (Value::Object(mut kept), Value::Object(new)) => {
            for (name, value) in new {
                kept.entry(name).or_insert(value);
            }
            Value::Object(kept)
        }
        (Value::Null, incoming) => incoming,
        (existing, _) => existing,
    }
}
