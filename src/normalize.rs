//! Timeline item normalization.
//!
//! Maps the JSON objects returned by `statuses/user_timeline` onto
//! [`Record`]. Only the id and the text are mandatory; everything else is
//! copied or coerced to a string.

use crate::error::{Result, SyncError};
use crate::model::{RawItem, Record};
use serde_json::Value;

/// Base URL used when building post permalinks.
pub const PERMALINK_BASE: &str = "https://twitter.com";

/// String stored for absent structured fields (geo, coordinates, place).
pub const ABSENT_FIELD: &str = "None";

/// Normalize one raw timeline item.
///
/// # Errors
///
/// Returns [`SyncError::MalformedItem`] if the item has no identifier or no
/// text.
pub fn normalize(item: &RawItem) -> Result<Record> {
    let external_id = string_or_number(item, "id_str", "id")
        .ok_or_else(|| SyncError::malformed_item("item has no id_str or id"))?;

    let text = item["full_text"]
        .as_str()
        .or_else(|| item["text"].as_str())
        .ok_or_else(|| {
            SyncError::malformed_item(format!("item {external_id} has no full_text or text"))
        })?
        .to_string();

    let permalink = item["user"]["screen_name"].as_str().map_or_else(
        || format!("{PERMALINK_BASE}/i/web/status/{external_id}"),
        |handle| format!("{PERMALINK_BASE}/{handle}/status/{external_id}"),
    );

    Ok(Record {
        created_at: item["created_at"].as_str().unwrap_or_default().to_string(),
        text,
        source: item["source"].as_str().unwrap_or_default().to_string(),
        retweet_count: item["retweet_count"].as_i64().unwrap_or(0),
        favorite_count: item["favorite_count"].as_i64().unwrap_or(0),
        geo: structured_field(&item["geo"]),
        coordinates: structured_field(&item["coordinates"]),
        place: structured_field(&item["place"]),
        reply_to_id: string_or_number(item, "in_reply_to_status_id_str", "in_reply_to_status_id"),
        permalink,
        external_id,
    })
}

/// Read a field that may come as a string or, as a fallback, as a number.
fn string_or_number(item: &Value, str_key: &str, num_key: &str) -> Option<String> {
    item[str_key]
        .as_str()
        .map(String::from)
        .or_else(|| item[num_key].as_u64().map(|n| n.to_string()))
        .or_else(|| item[num_key].as_str().map(String::from))
}

fn structured_field(value: &Value) -> String {
    match value {
        Value::Null => ABSENT_FIELD.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
