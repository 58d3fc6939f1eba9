/// Single-slot cache for the aggregated working set
use time::OffsetDateTime;
use tokio::time::{Duration, Instant};

use crate::models::{AggregatedReading, Pagination, ReadingFilter, ReadingSlice};

#[derive(Debug, Clone)]
struct CacheEntry {
    readings: Vec<AggregatedReading>,
    fetched_at: Instant,
    fetched_at_utc: OffsetDateTime,
}

/// Holds the most recent default-filter working set and its fetch time.
///
/// Writes are ordered by fetch ticket: a fetch that began before the last
/// committed one, or before the last `clear()`, cannot overwrite the slot.
#[derive(Debug, Default)]
pub struct CacheStore {
    entry: Option<CacheEntry>,
    next_ticket: u64,
    committed_ticket: u64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff data is present and younger than `ttl`
    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.is_valid_at(Instant::now(), ttl)
    }

    pub fn is_valid_at(&self, now: Instant, ttl: Duration) -> bool {
        match &self.entry {
            Some(entry) => now.saturating_duration_since(entry.fetched_at) < ttl,
            None => false,
        }
    }

    pub fn get(&self) -> Option<&[AggregatedReading]> {
        self.entry.as_ref().map(|entry| entry.readings.as_slice())
    }

    /// Wall-clock time of the cached fetch
    pub fn fetched_at(&self) -> Option<OffsetDateTime> {
        self.entry.as_ref().map(|entry| entry.fetched_at_utc)
    }

    /// Replace the working set wholesale and stamp it with the current time
    pub fn set(&mut self, readings: Vec<AggregatedReading>) {
        let ticket = self.begin_fetch();
        self.commit(ticket, readings);
    }

    pub fn clear(&mut self) {
        self.entry = None;
        self.committed_ticket = self.next_ticket;
    }

    /// Reserve a ticket for a fetch that is about to start
    pub fn begin_fetch(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Store the result of the fetch holding `ticket`
    ///
    /// Returns false, leaving the slot untouched, when the result has been
    /// superseded by a newer commit or a clear.
    pub fn commit(&mut self, ticket: u64, readings: Vec<AggregatedReading>) -> bool {
        if ticket <= self.committed_ticket {
            return false;
        }
        self.committed_ticket = ticket;
        self.entry = Some(CacheEntry {
            readings,
            fetched_at: Instant::now(),
            fetched_at_utc: OffsetDateTime::now_utc(),
        });
        true
    }

    /// Filter and paginate the cached working set without touching the network
    pub fn slice(&self, filter: &ReadingFilter) -> ReadingSlice {
        paginate(self.get().unwrap_or_default(), filter)
    }
}

/// Apply the filter's predicates, then offset/limit pagination
///
/// `total` and `total_pages` describe the filtered set, not the input.
pub fn paginate(readings: &[AggregatedReading], filter: &ReadingFilter) -> ReadingSlice {
    let page = filter.page();
    let limit = filter.limit();
    let matching: Vec<&AggregatedReading> = readings
        .iter()
        .filter(|r| filter.matches(&r.reading))
        .collect();

    let total = matching.len();
    let per_page = limit as usize;
    let offset = (page as usize - 1).saturating_mul(per_page);
    let data = matching
        .into_iter()
        .skip(offset)
        .take(per_page)
        .cloned()
        .collect();

    ReadingSlice {
        data,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: (total + per_page - 1) / per_page,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawReading;
    use std::collections::BTreeMap;

    fn point(station: &str, second: u32) -> AggregatedReading {
        AggregatedReading {
            reading: RawReading {
                station_id: Some(station.to_string()),
                mac_address: None,
                timestamp: format!("2024-01-01T00:{:02}:{:02}Z", second / 60, second % 60),
                values: BTreeMap::new(),
                alert_count: 0,
            },
            source_count: 1,
            contributing_station_ids: vec![station.to_string()],
        }
    }

    #[test]
    fn empty_store_is_invalid_and_slices_empty() {
        let store = CacheStore::new();
        assert!(!store.is_valid(Duration::from_secs(30)));
        assert!(store.get().is_none());
        let slice = store.slice(&ReadingFilter::default());
        assert!(slice.data.is_empty());
        assert_eq!(slice.pagination.total, 0);
        assert_eq!(slice.pagination.total_pages, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_boundary() {
        let ttl = Duration::from_secs(30);
        let mut store = CacheStore::new();
        store.set(vec![point("A", 0)]);

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        assert!(store.is_valid(ttl));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!store.is_valid(ttl));
        // Stale data is still served by get
        assert_eq!(store.get().map(|r| r.len()), Some(1));
    }

    #[test]
    fn clear_empties_the_slot() {
        let mut store = CacheStore::new();
        store.set(vec![point("A", 0)]);
        assert!(store.fetched_at().is_some());
        store.clear();
        assert!(store.get().is_none());
        assert!(store.fetched_at().is_none());
        assert!(!store.is_valid(Duration::from_secs(30)));
    }

    #[test]
    fn superseded_fetch_does_not_overwrite() {
        let mut store = CacheStore::new();
        let older = store.begin_fetch();
        let newer = store.begin_fetch();
        assert!(store.commit(newer, vec![point("new", 0)]));
        assert!(!store.commit(older, vec![point("old", 0)]));
        assert_eq!(
            store.get().unwrap()[0].reading.station_id.as_deref(),
            Some("new")
        );
    }

    #[test]
    fn fetch_started_before_clear_is_discarded() {
        let mut store = CacheStore::new();
        let in_flight = store.begin_fetch();
        store.clear();
        assert!(!store.commit(in_flight, vec![point("A", 0)]));
        assert!(store.get().is_none());

        let after = store.begin_fetch();
        assert!(store.commit(after, vec![point("A", 0)]));
    }

    #[test]
    fn pagination_counts_filtered_records() {
        let mut readings: Vec<AggregatedReading> = (0..25).map(|i| point("A", i)).collect();
        readings.extend((25..40).map(|i| point("B", i)));
        let mut store = CacheStore::new();
        store.set(readings);

        let slice = store.slice(&ReadingFilter::for_station("A").with_page(3, 10));
        assert_eq!(slice.data.len(), 5);
        assert_eq!(slice.pagination.total, 25);
        assert_eq!(slice.pagination.total_pages, 3);
        assert_eq!(slice.data[0].reading.timestamp, "2024-01-01T00:00:20Z");
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let readings: Vec<AggregatedReading> = (0..5).map(|i| point("A", i)).collect();
        let slice = paginate(&readings, &ReadingFilter::default().with_page(4, 2));
        assert!(slice.data.is_empty());
        assert_eq!(slice.pagination.total_pages, 3);
        assert_eq!(slice.pagination.page, 4);
    }
}
