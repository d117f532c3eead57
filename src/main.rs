use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use websdl_viz::config::Config;
use websdl_viz::dataloader::DataloaderClient;
use websdl_viz::plotting::{ChartModel, VisualizationSession, AXIS_SLOTS};
use websdl_viz::services::csv_export::{default_export_dates, write_series_csv};
use websdl_viz::services::sparkline::{self, EXTENT_HOURS, GAP_HOURS};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,websdl_viz=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration (fail-fast)
    let config = Config::from_env()?;
    let site_code = config.require_site_code()?.to_string();
    tracing::info!(
        portal = %config.portal_base_url,
        site_code = %site_code,
        quick_range = ?config.quick_range,
        "Configuration loaded"
    );

    let client = Arc::new(DataloaderClient::new(&config)?);
    let mut session = VisualizationSession::new(client.clone(), ChartModel::new());

    session.load_site(&site_code).await?;
    for panel in session.series_panels() {
        tracing::info!(result_id = panel.result_id, label = %panel.label.replace('\n', " | "), "Series available");
    }

    session.apply_quick_range(config.quick_range, Utc::now()).await?;

    // Without an explicit selection, fill the axes in list order.
    let to_plot: Vec<_> = if config.plot_result_ids.is_empty() {
        session
            .series_panels()
            .iter()
            .take(AXIS_SLOTS)
            .map(|p| p.result_id)
            .collect()
    } else {
        config.plot_result_ids.clone()
    };

    for result_id in to_plot {
        if let Err(e) = session.plot_series(result_id).await {
            tracing::warn!(error = %e, result_id, "Series not plotted");
        }
    }
    for notice in session.take_notices() {
        tracing::warn!(%notice, "User notice");
    }

    let now = Utc::now();
    let columns = session.plotted_columns().await;
    for (name, points) in &columns {
        let runs = sparkline::split_at_gaps(points, Duration::hours(GAP_HOURS)).len();
        let stale = sparkline::is_stale(
            points.last().map(|p| p.timestamp),
            now,
            Duration::hours(EXTENT_HOURS),
        );
        tracing::info!(series = %name, points = points.len(), runs, stale, "Plotted series");
    }

    if let Some(path) = &config.chart_json_path {
        std::fs::write(path, session.chart().to_json()?)?;
        tracing::info!(path = %path, "Chart model written");
    }

    if let Some(path) = &config.export_csv_path {
        write_series_csv(std::fs::File::create(path)?, &columns)?;
        tracing::info!(path = %path, "Cached series exported");
    }

    let latest = columns
        .iter()
        .filter_map(|(_, points)| points.last().map(|p| p.timestamp))
        .max();
    let (dialog_min, dialog_max) = default_export_dates(latest, now.date_naive());
    tracing::info!(%dialog_min, %dialog_max, "Export dialog defaults");

    let export = session.csv_export_request();
    tracing::info!(url = %export.url(client.base_url())?, "Server CSV export");
    if let Some(path) = &config.download_csv_path {
        let body = client.download_csv(&export).await?;
        std::fs::write(path, body)?;
        tracing::info!(path = %path, "Server CSV export downloaded");
    }

    Ok(())
}
