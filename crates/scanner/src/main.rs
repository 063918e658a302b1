//! Rightsizer scanner
//!
//! Periodically sweeps the locally staged metric files, runs the
//! recommendation engine over each resource, and appends the resulting
//! records to per-tenant report files. Serves health and Prometheus
//! metrics endpoints while it runs.

use anyhow::{Context, Result};
use engine_lib::{
    FlatSavings, InMemoryCatalog, InMemoryHistoryStore, RecommendationEngine, ReportWriter,
    ResourceContext, ResourceMeta, ResourceType, StaticPricing,
};
use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod storage;

use config::ScannerConfig;
use storage::SeriesLoader;

const SCANNER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with env-filterable level
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = SCANNER_VERSION, "Starting rightsizer-scanner");

    let config = ScannerConfig::load()?;
    info!(
        data_dir = %config.data_dir,
        customer = %config.customer,
        "Scanner configured"
    );

    let catalog = load_catalog(&config)?;
    let prices = load_prices(&config)?;

    let engine = Arc::new(RecommendationEngine::new(
        Arc::new(catalog),
        Arc::new(StaticPricing::new(prices.clone())),
        Arc::new(FlatSavings::new(StaticPricing::new(prices))),
        Arc::new(InMemoryHistoryStore::new()),
        config.engine.clone(),
    )?);

    let state = api::AppState::new();
    let api_handle = tokio::spawn(api::serve(config.api_port, state.clone()));
    state.set_ready(true);

    let scan_config = config.clone();
    let scan_engine = engine.clone();
    let scan_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(
            scan_config.scan_interval_secs.max(1),
        ));
        loop {
            interval.tick().await;
            if let Err(err) = run_scan(&scan_config, &scan_engine) {
                error!(%err, "scan failed");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    scan_handle.abort();
    api_handle.abort();

    Ok(())
}

fn load_catalog(config: &ScannerConfig) -> Result<InMemoryCatalog> {
    let file = File::open(&config.catalog_path)
        .with_context(|| format!("opening shape catalog {}", config.catalog_path))?;
    let catalog = InMemoryCatalog::from_reader(file)?;
    info!(shapes = catalog.len(), "Shape catalog loaded");
    Ok(catalog)
}

fn load_prices(config: &ScannerConfig) -> Result<HashMap<String, f64>> {
    match &config.prices_path {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening price table {path}"))?;
            let prices: HashMap<String, f64> =
                serde_json::from_reader(file).context("parsing price table")?;
            info!(entries = prices.len(), "Price table loaded");
            Ok(prices)
        }
        None => {
            warn!("no price table configured, savings will be empty");
            Ok(HashMap::new())
        }
    }
}

/// One full sweep over the staged resources. A failing resource is
/// reported and the sweep continues.
fn run_scan(config: &ScannerConfig, engine: &RecommendationEngine) -> Result<()> {
    let settings = engine.settings();
    let loader = SeriesLoader::new(
        &config.data_dir,
        config.cloud,
        settings.segmenter.step_minutes,
        settings.min_allowed_days,
        settings.max_days,
    );
    let writer = ReportWriter::new(&config.output_dir);
    let meta = ResourceMeta {
        customer: config.customer.clone(),
        tenant: config.tenant.clone(),
        region: config.region.clone(),
        os: config.os.clone(),
        preferred_series: vec![],
    };

    let resources = loader.list_resources()?;
    info!(resources = resources.len(), "scan started");

    for path in resources {
        let record = match loader.load(&path) {
            Ok(series) => engine.recommend_resource(ResourceContext {
                series,
                meta: meta.clone(),
            }),
            Err(err) => engine.failure_record(
                SeriesLoader::resource_id(&path),
                ResourceType::Instance,
                config.cloud,
                meta.clone(),
                None,
                None,
                &err,
            ),
        };

        if let Err(err) = writer.append(&record) {
            error!(resource_id = %record.resource_id, %err, "failed to write report");
        }
    }

    info!("scan finished");
    Ok(())
}
