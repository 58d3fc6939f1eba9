use log::{error, info, warn};
use tokio::time::sleep;

use station_telemetry_cache::utils::{format_datetime, sensor_label};
use station_telemetry_cache::{
    HttpReadingFetcher, QueryOptions, QuerySettings, ReadingFilter, TelemetryConfig,
    TelemetryContext, TelemetryQuery,
};

async fn main_loop(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting telemetry polling against {}", config.api_url);

    let fetcher = HttpReadingFetcher::new(config.api_url.clone(), config.request_timeout)?;
    let query = TelemetryQuery::new(
        fetcher,
        TelemetryContext::from_config(&config),
        QuerySettings::from_config(&config),
    );

    loop {
        let response = query
            .query(&ReadingFilter::default(), QueryOptions::default())
            .await;

        match &response.error {
            Some(e) => error!("Poll failed: {}", e),
            None => {
                info!(
                    "{} timeline points ({} pages)",
                    response.pagination.total, response.pagination.total_pages
                );
                if let Some(updated) = query.last_updated() {
                    info!("  Cache updated at: {}", format_datetime(&updated));
                }
            }
        }

        // Print summary of the newest point on this page
        match response.data.last() {
            Some(latest) => {
                info!(
                    "Latest point {} from {} report(s):",
                    latest.reading.timestamp, latest.source_count
                );
                for (key, value) in &latest.reading.values {
                    info!("  {}: {:.2}", sensor_label(key), value);
                }
            }
            None => warn!("No readings available yet"),
        }

        let legend: Vec<String> = query
            .sensor_types()
            .into_iter()
            .map(|t| format!("{} {}", t.label, t.color))
            .collect();
        if !legend.is_empty() {
            info!("  Sensors: {}", legend.join(", "));
        }

        sleep(config.poll_interval).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match TelemetryConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });

    tokio::select! {
        result = main_loop(config) => {
            if let Err(e) = result {
                error!("Fatal error: {}", e);
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
