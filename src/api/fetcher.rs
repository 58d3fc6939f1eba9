/// HTTP retrieval of raw telemetry pages from the readings endpoint
use log::debug;
use std::future::Future;
use time::format_description::well_known::Rfc3339;
use tokio::time::Duration;
use url::Url;

use crate::error::TelemetryError;
use crate::models::{ReadingFilter, ReadingPage};

/// Source of raw telemetry pages.
///
/// One call is one request: implementations never retry and never touch
/// the cache.
pub trait ReadingSource {
    fn fetch(
        &self,
        filter: &ReadingFilter,
    ) -> impl Future<Output = Result<ReadingPage, TelemetryError>> + Send;
}

/// Reading source backed by the REST readings endpoint
#[derive(Debug, Clone)]
pub struct HttpReadingFetcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpReadingFetcher {
    /// Create a fetcher with a fixed per-request timeout
    ///
    /// A request exceeding `timeout` fails as a network error and so never
    /// opens the server-error cooldown.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Network(format!("HTTP client setup failed: {}", e)))?;
        Ok(HttpReadingFetcher { client, endpoint })
    }

    /// Endpoint URL with the filter encoded as query parameters
    pub fn request_url(&self, filter: &ReadingFilter) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(station_id) = &filter.station_id {
                query.append_pair("stationId", station_id);
            }
            if let Some(mac) = &filter.mac_address {
                query.append_pair("macAddress", mac);
            }
            if let Some(start) = filter.start_time.and_then(|t| t.format(&Rfc3339).ok()) {
                query.append_pair("startTime", &start);
            }
            if let Some(end) = filter.end_time.and_then(|t| t.format(&Rfc3339).ok()) {
                query.append_pair("endTime", &end);
            }
            query.append_pair("page", &filter.page().to_string());
            query.append_pair("limit", &filter.limit().to_string());
        }
        url
    }
}

impl ReadingSource for HttpReadingFetcher {
    async fn fetch(&self, filter: &ReadingFilter) -> Result<ReadingPage, TelemetryError> {
        let url = self.request_url(filter);
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::from_status(status.as_u16()));
        }

        let body = response.bytes().await?;
        parse_envelope(&body)
    }
}

/// Decode and validate a `{ data, pagination }` envelope
///
/// Every reading needs a station id or MAC address and an RFC 3339
/// timestamp; anything else is reported as a parse error.
pub fn parse_envelope(body: &[u8]) -> Result<ReadingPage, TelemetryError> {
    let page: ReadingPage =
        serde_json::from_slice(body).map_err(|e| TelemetryError::Parse(e.to_string()))?;

    for (index, reading) in page.data.iter().enumerate() {
        if !reading.has_identity() {
            return Err(TelemetryError::Parse(format!(
                "reading {} has neither stationId nor macAddress",
                index
            )));
        }
        if reading.instant().is_none() {
            return Err(TelemetryError::Parse(format!(
                "reading {} has invalid timestamp '{}'",
                index, reading.timestamp
            )));
        }
    }

    Ok(page)
}
