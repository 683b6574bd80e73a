// src/services/normalize.rs

//! Normalization of loosely shaped stats API responses.
//!
//! The stats service has changed its field naming more than once, so counters
//! are looked up under several keys in a fixed priority order.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::StatsSnapshot;

/// Build a snapshot from a raw API document.
///
/// Accepts an object or a non-empty array whose first element is an object.
/// Returns `None` for anything else. Missing or malformed counters become 0.
pub fn normalize_stats(
    username: &str,
    raw: &Value,
    captured_at: DateTime<Utc>,
) -> Option<StatsSnapshot> {
    let record = match raw {
        Value::Object(map) => map,
        Value::Array(items) => items.first()?.as_object()?,
        _ => return None,
    };

    let growth = record.get("growth").and_then(Value::as_object);

    Some(StatsSnapshot {
        username: username.to_string(),
        followers: counter(record, "followers"),
        following: counter(record, "following"),
        tweet_count: counter(record, "tweets"),
        verified: record.get("verified").and_then(as_flag),
        description: text_field(record, &["description", "bio"]),
        profile_image_url: text_field(record, &["profileImageUrl", "profile_image_url"]),
        growth_24h: growth.and_then(|g| growth_field(g, "24h")),
        growth_7d: growth.and_then(|g| growth_field(g, "7d")),
        growth_30d: growth.and_then(|g| growth_field(g, "30d")),
        captured_at,
    })
}

/// `<name>Count`, then `<name>`, then `stats.<name>`, then `<name>_count`.
fn counter(record: &Map<String, Value>, name: &str) -> u64 {
    let nested = record
        .get("stats")
        .and_then(Value::as_object)
        .and_then(|stats| stats.get(name));

    record
        .get(&format!("{name}Count"))
        .or_else(|| record.get(name))
        .or(nested)
        .or_else(|| record.get(&format!("{name}_count")))
        .and_then(as_count)
        .unwrap_or(0)
}

fn growth_field(growth: &Map<String, Value>, window: &str) -> Option<i64> {
    growth
        .get(&format!("followers_{window}"))
        .or_else(|| growth.get(&format!("followers{window}")))
        .and_then(as_signed)
}

fn text_field(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Non-negative integer from a number or numeric string. Negatives clamp to 0.
fn as_count(value: &Value) -> Option<u64> {
    as_signed(value).map(|n| n.max(0) as u64)
}

fn as_signed(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
