/// Merging of duplicate station reports into one timeline point per timestamp
use std::collections::{BTreeMap, HashMap};

use crate::models::{AggregatedReading, RawReading};

/// Merge readings that share a timestamp into single timeline points
///
/// Readings merge only when their timestamp strings are identical. Within a
/// group each sensor key is averaged over the members that reported it;
/// members missing the key do not count towards its mean. The result is
/// sorted ascending by timestamp regardless of input order.
///
/// # Arguments
/// * `readings` - Raw readings as returned by the backend
///
/// # Returns
/// One AggregatedReading per distinct timestamp
pub fn aggregate(readings: &[RawReading]) -> Vec<AggregatedReading> {
    // Group by exact timestamp, keeping first-seen order within a group
    let mut group_index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&RawReading>> = Vec::new();
    for reading in readings {
        let index = *group_index
            .entry(reading.timestamp.as_str())
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[index].push(reading);
    }

    let mut merged: Vec<AggregatedReading> = groups.into_iter().map(merge_group).collect();

    // Parsed instant first so mixed offsets order correctly, string as tiebreak
    merged.sort_by(|a, b| {
        let key_a = (a.reading.instant(), &a.reading.timestamp);
        let key_b = (b.reading.instant(), &b.reading.timestamp);
        key_a.cmp(&key_b)
    });
    merged
}

fn merge_group(group: Vec<&RawReading>) -> AggregatedReading {
    let first = group[0];
    let mut contributing_station_ids: Vec<String> = Vec::new();
    for station_id in group.iter().filter_map(|r| r.station_id.as_ref()) {
        if !contributing_station_ids.contains(station_id) {
            contributing_station_ids.push(station_id.clone());
        }
    }

    if group.len() == 1 {
        return AggregatedReading {
            reading: first.clone(),
            source_count: 1,
            contributing_station_ids,
        };
    }

    // Sum and count per key over the members that reported it
    let mut sums: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    for reading in &group {
        for (key, value) in &reading.values {
            let entry = sums.entry(key.as_str()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    let values = sums
        .into_iter()
        .map(|(key, (sum, count))| (key.to_string(), sum / f64::from(count)))
        .collect();

    AggregatedReading {
        reading: RawReading {
            station_id: first.station_id.clone(),
            mac_address: first.mac_address.clone(),
            timestamp: first.timestamp.clone(),
            values,
            alert_count: group
                .iter()
                .fold(0u32, |total, r| total.saturating_add(r.alert_count)),
        },
        source_count: group.len(),
        contributing_station_ids,
    }
}
