use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One telemetry report from a station at a point in time.
///
/// Sensor keys are hardware-defined and open-ended, so `values` is a map
/// rather than a struct with one field per sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
    #[serde(default)]
    pub alert_count: u32,
}

impl RawReading {
    /// Parsed timestamp, `None` if it is not RFC 3339
    pub fn instant(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.timestamp, &Rfc3339).ok()
    }

    pub fn has_identity(&self) -> bool {
        self.station_id.is_some() || self.mac_address.is_some()
    }
}

/// One timeline point: every reading sharing a timestamp, merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReading {
    #[serde(flatten)]
    pub reading: RawReading,
    pub source_count: usize,
    pub contributing_station_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize,
}

/// Body returned by the readings endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadingPage {
    pub data: Vec<RawReading>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// A page of aggregated readings handed back to the UI.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReadingSlice {
    pub data: Vec<AggregatedReading>,
    pub pagination: Pagination,
}

/// Query filter. Station and time constraints are request-scoped;
/// `page`/`limit` fall back to the facade defaults when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingFilter {
    pub station_id: Option<String>,
    pub mac_address: Option<String>,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 100;

impl ReadingFilter {
    pub fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn for_station(station_id: impl Into<String>) -> Self {
        ReadingFilter {
            station_id: Some(station_id.into()),
            ..Default::default()
        }
    }

    /// True when only `page`/`limit` are set: the one shape that is cached.
    pub fn is_default(&self) -> bool {
        self.station_id.is_none()
            && self.mac_address.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }

    /// Page number, never below 1
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size, never below 1
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1)
    }

    /// Fill unset `page`/`limit` from `defaults`. Constraints are never inherited.
    pub fn merged_over(&self, defaults: &ReadingFilter) -> ReadingFilter {
        ReadingFilter {
            page: self.page.or(defaults.page),
            limit: self.limit.or(defaults.limit),
            ..self.clone()
        }
    }

    pub fn matches(&self, reading: &RawReading) -> bool {
        if let Some(station_id) = &self.station_id {
            if reading.station_id.as_ref() != Some(station_id) {
                return false;
            }
        }
        if let Some(mac) = &self.mac_address {
            let matches_mac = reading
                .mac_address
                .as_deref()
                .map_or(false, |m| m.eq_ignore_ascii_case(mac));
            if !matches_mac {
                return false;
            }
        }
        if self.start_time.is_none() && self.end_time.is_none() {
            return true;
        }
        let instant = match reading.instant() {
            Some(instant) => instant,
            None => return false,
        };
        self.start_time.map_or(true, |start| instant >= start)
            && self.end_time.map_or(true, |end| instant <= end)
    }
}

/// Legend entry for one observed sensor key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorType {
    pub key: String,
    pub label: String,
    pub color: &'static str,
}
