use anyhow::Context;
use axum::{Router, response::IntoResponse, routing::get};
use blindview_server::compose::OverlayEngine;
use blindview_server::config::Config;
use blindview_server::detection::DetectionOrchestrator;
use blindview_server::pipeline::TryOnPipeline;
use blindview_server::routes::{AppState, app_routes};
use blindview_server::storage::{ArtifactRepository, connect_store};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Ensure a directory exists, creating it if necessary.
/// Returns true if directory exists and is empty.
fn ensure_directory(path: &Path, name: &str) -> std::io::Result<bool> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created {} directory: {:?}", name, path);
        Ok(true)
    } else if path.is_dir() {
        Ok(path.read_dir()?.next().is_none())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} path {:?} exists but is not a directory", name, path),
        ))
    }
}

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Refresh cache gauges and uptime (called periodically)
fn update_gauge_metrics(pipeline: &TryOnPipeline) {
    let snapshot = pipeline.stats();
    metrics::gauge!("blindview_detections_performed").set(snapshot.detections as f64);
    metrics::gauge!("blindview_compositions_performed").set(snapshot.compositions as f64);

    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    metrics::gauge!("blindview_uptime_seconds").set(uptime as f64);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    START_TIME.set(Instant::now()).ok();

    // Must be installed before any metrics are recorded
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blindview=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}",
        config.host, config.port
    );
    if let Some(ref base_url) = config.public_base_url {
        info!("Public base URL: {}", base_url);
    }

    match ensure_directory(&config.overlay.textures_dir, "textures") {
        Ok(true) => warn!(
            "Textures directory {:?} is empty - texture coverings will be rejected",
            config.overlay.textures_dir
        ),
        Ok(false) => {}
        Err(e) => warn!(
            "Failed to create textures directory {:?}: {}",
            config.overlay.textures_dir, e
        ),
    }

    let store = connect_store(&config.storage, config.public_base_url.clone())
        .await
        .context("Failed to initialize artifact storage")?;
    let repository = ArtifactRepository::new(store);

    let orchestrator = DetectionOrchestrator::from_config(&config.detection)
        .context("Failed to initialize detectors")?;

    let engine = OverlayEngine::from_config(&config.overlay, config.detection.aspect_tolerance);
    let pipeline = Arc::new(TryOnPipeline::new(
        repository,
        orchestrator,
        engine,
        &config.cache,
    ));

    // Periodic update of gauge metrics (every 5 seconds)
    let metrics_pipeline = pipeline.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            update_gauge_metrics(&metrics_pipeline);
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/metrics/prometheus", get(prometheus_metrics))
        .merge(app_routes(AppState { pipeline }))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("BlindView server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
