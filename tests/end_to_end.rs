use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Duration;
use url::Url;

use station_telemetry_cache::{
    HttpReadingFetcher, QueryOptions, QuerySettings, ReadingFilter, TelemetryConfig,
    TelemetryContext, TelemetryError, TelemetryQuery,
};

/// Local HTTP backend replaying (status line, body) pairs; the last pair repeats
struct FakeBackend {
    url: Url,
    hits: Arc<AtomicUsize>,
}

async fn start_backend(responses: Vec<(&'static str, &'static str)>) -> FakeBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let responses = Arc::new(Mutex::new(responses));

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let hit = counter.fetch_add(1, Ordering::SeqCst);
            let (status_line, body) = {
                let responses = responses.lock().unwrap();
                responses[hit.min(responses.len() - 1)]
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    FakeBackend {
        url: Url::parse(&format!("http://{}/api/readings", addr)).unwrap(),
        hits,
    }
}

fn query_for(backend: &FakeBackend) -> TelemetryQuery<HttpReadingFetcher> {
    let mut config = TelemetryConfig::with_api_url(backend.url.clone());
    config.min_request_interval = Duration::from_millis(10);
    let fetcher = HttpReadingFetcher::new(config.api_url.clone(), config.request_timeout).unwrap();
    TelemetryQuery::new(
        fetcher,
        TelemetryContext::from_config(&config),
        QuerySettings::from_config(&config),
    )
}

const TWO_STATIONS: &str = r#"{
    "data": [
        {"stationId": "A", "timestamp": "2024-01-01T00:00:00Z", "values": {"temperatura": 22}, "alertCount": 0},
        {"stationId": "B", "timestamp": "2024-01-01T00:00:00Z", "values": {"temperatura": 24, "umidade": 60}, "alertCount": 1}
    ],
    "pagination": {"page": 1, "limit": 1000, "total": 2, "totalPages": 1}
}"#;

#[tokio::test]
async fn duplicate_station_reports_become_one_point() {
    let backend = start_backend(vec![("200 OK", TWO_STATIONS)]).await;
    let query = query_for(&backend);

    let response = query
        .query(&ReadingFilter::default(), QueryOptions::default())
        .await;

    assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
    assert_eq!(response.data.len(), 1);
    let point = &response.data[0];
    assert_eq!(point.reading.timestamp, "2024-01-01T00:00:00Z");
    assert_eq!(point.reading.values.len(), 2);
    assert_eq!(point.reading.values["temperatura"], 23.0);
    assert_eq!(point.reading.values["umidade"], 60.0);
    assert_eq!(point.source_count, 2);
    assert_eq!(point.contributing_station_ids, vec!["A", "B"]);
    assert_eq!(response.pagination.total, 1);

    // Second default query is served from cache
    query
        .query(&ReadingFilter::default(), QueryOptions::default())
        .await;
    assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn service_outage_triggers_local_cooldown() {
    let backend = start_backend(vec![
        ("503 Service Unavailable", r#"{"error":"down"}"#),
        ("200 OK", TWO_STATIONS),
    ])
    .await;
    let query = query_for(&backend);

    let failed = query
        .query(&ReadingFilter::default(), QueryOptions::default())
        .await;
    assert_eq!(failed.error, Some(TelemetryError::Server { status: 503 }));

    let rejected = query
        .query(&ReadingFilter::default(), QueryOptions::default())
        .await;
    match rejected.error {
        Some(TelemetryError::Cooldown { remaining_seconds }) => {
            assert!(remaining_seconds > 0 && remaining_seconds <= 60)
        }
        other => panic!("expected cooldown, got {:?}", other),
    }
    assert_eq!(backend.hits.load(Ordering::SeqCst), 1);

    query.context().limiter().reset();
    let recovered = query
        .query(&ReadingFilter::default(), QueryOptions::default())
        .await;
    assert!(recovered.error.is_none());
    assert_eq!(recovered.data.len(), 1);
    assert_eq!(backend.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn malformed_body_surfaces_parse_error_without_cooldown() {
    let backend = start_backend(vec![("200 OK", r#"{"rows": []}"#)]).await;
    let query = query_for(&backend);

    let response = query
        .query(&ReadingFilter::default(), QueryOptions::default())
        .await;
    assert!(matches!(response.error, Some(TelemetryError::Parse(_))));
    assert!(query.cooldown_remaining().is_none());
    assert!(response.data.is_empty());
}
