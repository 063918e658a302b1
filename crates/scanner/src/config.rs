//! Scanner configuration

use anyhow::Result;
use engine_lib::{Cloud, EngineSettings};
use serde::Deserialize;

/// Scanner configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Directory with one `<resource_id>.jsonl` metric file per resource
    pub data_dir: String,

    /// Directory the report files are appended to
    pub output_dir: String,

    /// JSON shape catalog path
    pub catalog_path: String,

    /// Optional JSON price table path (shape name -> hourly price)
    pub prices_path: Option<String>,

    /// API server port for health/metrics
    pub api_port: u16,

    /// Seconds between scans
    pub scan_interval_secs: u64,

    /// Tenant placement stamped on every record
    pub customer: String,
    pub tenant: String,
    pub region: String,
    pub os: String,
    pub cloud: Cloud,

    /// Engine tunables
    pub engine: EngineSettings,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            output_dir: "./reports".to_string(),
            catalog_path: "./shapes.json".to_string(),
            prices_path: None,
            api_port: 8080,
            scan_interval_secs: 3600,
            customer: "default".to_string(),
            tenant: "default".to_string(),
            region: "us-east-1".to_string(),
            os: "linux".to_string(),
            cloud: Cloud::Aws,
            engine: EngineSettings::default(),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from an optional file and the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("scanner").required(false))
            .add_source(config::Environment::with_prefix("SCANNER").separator("__"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}
