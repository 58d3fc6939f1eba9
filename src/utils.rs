/// Utility functions for formatting and chart legend labelling
use std::collections::BTreeSet;
use time::{format_description, OffsetDateTime};

use crate::models::SensorType;

/// Fixed legend palette, assigned in sorted key order and cycled
pub const SENSOR_PALETTE: [&str; 8] = [
    "#3b82f6", "#ef4444", "#10b981", "#f59e0b", "#8b5cf6", "#ec4899", "#14b8a6", "#6b7280",
];

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Display label for a sensor key: underscores become spaces and the
/// first letter is capitalized ("temperatura" -> "Temperatura").
pub fn sensor_label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Build legend entries for the observed sensor keys
pub fn sensor_types(keys: &BTreeSet<String>) -> Vec<SensorType> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| SensorType {
            key: key.clone(),
            label: sensor_label(key),
            color: SENSOR_PALETTE[index % SENSOR_PALETTE.len()],
        })
        .collect()
}
