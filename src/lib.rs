//! Client-side cache and aggregation layer for weather-station telemetry.
//!
//! Data flows from the readings endpoint through the rate limiter, gets
//! merged into one point per timestamp and is kept in a single-slot cache
//! that serves filtered, paginated slices to the dashboard.

pub mod aggregation;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod utils;

pub use aggregation::aggregate;
pub use api::{HttpReadingFetcher, ReadingSource};
pub use cache::{CacheStore, RateLimiter};
pub use config::TelemetryConfig;
pub use error::{ConfigError, TelemetryError};
pub use models::{
    AggregatedReading, Pagination, RawReading, ReadingFilter, ReadingSlice, SensorType,
};
pub use query::{
    QueryOptions, QueryPhase, QueryResponse, QuerySettings, QueryStatus, TelemetryContext,
    TelemetryQuery,
};
