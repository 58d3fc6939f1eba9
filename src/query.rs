/// Query facade: the single entry point the dashboard talks to
use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tokio::time::Duration;

use crate::aggregation::aggregate;
use crate::api::ReadingSource;
use crate::cache::{paginate, CacheStore, RateLimiter};
use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::models::{AggregatedReading, Pagination, ReadingFilter, ReadingSlice, SensorType};
use crate::utils::sensor_types;

/// Cache and cooldown state shared by every query of one facade
#[derive(Debug)]
pub struct TelemetryContext {
    cache: Mutex<CacheStore>,
    limiter: RateLimiter,
}

impl TelemetryContext {
    pub fn new(min_request_interval: Duration, cooldown: Duration) -> Self {
        TelemetryContext {
            cache: Mutex::new(CacheStore::new()),
            limiter: RateLimiter::new(min_request_interval, cooldown),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.min_request_interval, config.cooldown)
    }

    fn cache(&self) -> MutexGuard<'_, CacheStore> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub cache_ttl: Duration,
    /// Rows requested from the backend per fetch; the working set size
    pub fetch_limit: u32,
    pub default_filter: ReadingFilter,
}

impl QuerySettings {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        QuerySettings {
            cache_ttl: config.cache_ttl,
            fetch_limit: config.fetch_limit,
            default_filter: ReadingFilter {
                limit: Some(config.page_limit),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryPhase {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Observable state for the UI
#[derive(Debug, Clone, Default)]
pub struct QueryStatus {
    pub phase: QueryPhase,
    pub loading: bool,
    pub refreshing: bool,
    pub error: Option<TelemetryError>,
    pub data: Vec<AggregatedReading>,
    pub pagination: Pagination,
}

/// Result of a query. On failure `error` is set and `data`/`pagination`
/// hold the last successful result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResponse {
    pub data: Vec<AggregatedReading>,
    pub pagination: Pagination,
    pub error: Option<TelemetryError>,
}

#[derive(Debug, Default)]
struct FacadeState {
    status: QueryStatus,
    in_flight: usize,
    refreshes: usize,
    sensor_keys: BTreeSet<String>,
}

pub struct TelemetryQuery<S> {
    source: S,
    context: TelemetryContext,
    settings: QuerySettings,
    state: Mutex<FacadeState>,
}

impl<S: ReadingSource> TelemetryQuery<S> {
    pub fn new(source: S, context: TelemetryContext, settings: QuerySettings) -> Self {
        TelemetryQuery {
            source,
            context,
            settings,
            state: Mutex::new(FacadeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FacadeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve a page of aggregated readings
    ///
    /// Default-filter queries are answered from the cache while it is fresh.
    /// Everything else passes the rate limiter, fetches the working set and
    /// slices it for the requested filter. Expected failures
    /// come back in `QueryResponse::error`, never as a panic or `Err`.
    pub async fn query(&self, filter: &ReadingFilter, options: QueryOptions) -> QueryResponse {
        let filter = filter.merged_over(&self.settings.default_filter);

        if !options.force_refresh && filter.is_default() {
            let cached = {
                let cache = self.context.cache();
                if cache.is_valid(self.settings.cache_ttl) {
                    Some(cache.slice(&filter))
                } else {
                    None
                }
            };
            if let Some(slice) = cached {
                debug!(
                    "Serving page {} from cache ({} of {} points)",
                    slice.pagination.page,
                    slice.data.len(),
                    slice.pagination.total
                );
                return self.finish(Ok(slice), false);
            }
        }

        self.state().begin_loading();
        let outcome = self.fetch_and_slice(&filter).await;
        self.finish(outcome, true)
    }

    /// Fetch the unfiltered working set, cache it and slice it locally.
    ///
    /// The backend request never carries station or time constraints, so
    /// every fetch refreshes the one cache slot.
    async fn fetch_and_slice(
        &self,
        filter: &ReadingFilter,
    ) -> Result<ReadingSlice, TelemetryError> {
        self.context.limiter.gate().await?;

        let ticket = self.context.cache().begin_fetch();
        let backend_filter = ReadingFilter {
            page: Some(1),
            limit: Some(self.settings.fetch_limit),
            ..Default::default()
        };
        let page = match self.source.fetch(&backend_filter).await {
            Ok(page) => page,
            Err(e) => {
                if e.is_server_error() {
                    self.context.limiter.trip();
                }
                return Err(e);
            }
        };

        let aggregated = aggregate(&page.data);
        info!(
            "Fetched {} readings, {} timeline points",
            page.data.len(),
            aggregated.len()
        );

        self.state().sensor_keys = aggregated
            .iter()
            .flat_map(|r| r.reading.values.keys().cloned())
            .collect();

        let slice = paginate(&aggregated, filter);
        if !self.context.cache().commit(ticket, aggregated) {
            debug!("Discarding superseded fetch result");
        }
        Ok(slice)
    }

    fn finish(
        &self,
        outcome: Result<ReadingSlice, TelemetryError>,
        fetched: bool,
    ) -> QueryResponse {
        let mut state = self.state();
        if fetched {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        let loading = state.in_flight > 0;
        let status = &mut state.status;
        status.loading = loading;

        match outcome {
            Ok(slice) => {
                status.phase = if loading {
                    QueryPhase::Loading
                } else {
                    QueryPhase::Success
                };
                status.error = None;
                status.data = slice.data.clone();
                status.pagination = slice.pagination;
                QueryResponse {
                    data: slice.data,
                    pagination: slice.pagination,
                    error: None,
                }
            }
            Err(e) => {
                status.phase = if loading {
                    QueryPhase::Loading
                } else {
                    QueryPhase::Error
                };
                status.error = Some(e.clone());
                QueryResponse {
                    data: status.data.clone(),
                    pagination: status.pagination,
                    error: Some(e),
                }
            }
        }
    }

    /// Drop the cache and reload the default query regardless of TTL
    pub async fn refresh_data(&self) -> QueryResponse {
        self.state().begin_refresh();
        self.context.cache().clear();
        let response = self
            .query(&ReadingFilter::default(), QueryOptions { force_refresh: true })
            .await;
        self.state().end_refresh();
        response
    }

    pub fn clear_cache(&self) {
        self.context.cache().clear();
    }

    /// Legend entries for the sensor keys seen in the last fetch
    pub fn sensor_types(&self) -> Vec<SensorType> {
        sensor_types(&self.state().sensor_keys)
    }

    pub fn status(&self) -> QueryStatus {
        self.state().status.clone()
    }

    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        self.context.cache().fetched_at()
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.context.limiter.cooldown_remaining()
    }

    pub fn context(&self) -> &TelemetryContext {
        &self.context
    }
}

impl FacadeState {
    fn begin_loading(&mut self) {
        self.in_flight += 1;
        self.status.loading = true;
        self.status.phase = QueryPhase::Loading;
    }

    fn begin_refresh(&mut self) {
        self.refreshes += 1;
        self.status.refreshing = true;
    }

    fn end_refresh(&mut self) {
        self.refreshes = self.refreshes.saturating_sub(1);
        self.status.refreshing = self.refreshes > 0;
    }
}
