//! Local metric storage
//!
//! Stand-in for the object-storage download layer: reads one
//! `<resource_id>.jsonl` sample file per resource from the data
//! directory, merges and gap-fills it into a `MetricSeries`, and
//! enforces the minimum-coverage contract.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use engine_lib::{Cloud, EngineError, MetricSample, MetricSeries, ResourceType};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One line of a metric file
#[derive(Debug, Deserialize)]
struct RawSample {
    timestamp: DateTime<Utc>,
    instance_type: String,
    cpu_load: f64,
    memory_load: f64,
    #[serde(default = "absent")]
    net_output_load: f64,
    #[serde(default = "absent")]
    avg_disk_iops: f64,
    #[serde(default = "absent")]
    max_disk_iops: f64,
}

fn absent() -> f64 {
    -1.0
}

/// Loads per-resource series from a local data directory
pub struct SeriesLoader {
    data_dir: PathBuf,
    cloud: Cloud,
    step_minutes: u32,
    min_allowed_days: u32,
    max_days: u32,
}

impl SeriesLoader {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        cloud: Cloud,
        step_minutes: u32,
        min_allowed_days: u32,
        max_days: u32,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            cloud,
            step_minutes,
            min_allowed_days,
            max_days,
        }
    }

    /// Metric files available for this scan, sorted for a stable order
    pub fn list_resources(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.data_dir)
            .with_context(|| format!("reading data dir {}", self.data_dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "jsonl"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Resource id a metric file belongs to
    pub fn resource_id(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Parse, merge, gap-fill and window one resource's samples
    pub fn load(&self, path: &Path) -> Result<MetricSeries, EngineError> {
        let resource_id = Self::resource_id(path);
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::MalformedSeries(format!("{}: {e}", path.display()))
        })?;

        let mut samples: Vec<MetricSample> = Vec::new();
        let mut instance_type: Option<String> = None;
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawSample = serde_json::from_str(line).map_err(|e| {
                EngineError::MalformedSeries(format!(
                    "{} line {}: {e}",
                    path.display(),
                    number + 1
                ))
            })?;
            instance_type.get_or_insert(raw.instance_type);
            samples.push(MetricSample {
                timestamp: raw.timestamp,
                cpu_load: raw.cpu_load,
                memory_load: raw.memory_load,
                net_output_load: raw.net_output_load,
                avg_disk_iops: raw.avg_disk_iops,
                max_disk_iops: raw.max_disk_iops,
            });
        }

        let instance_type = instance_type.ok_or_else(|| {
            EngineError::MalformedSeries(format!("{}: no samples", path.display()))
        })?;

        let mut series = MetricSeries::build(
            resource_id,
            ResourceType::Instance,
            self.cloud,
            instance_type,
            self.step_minutes,
            samples,
        )?;
        series.truncate_to_last_days(self.max_days);

        let covered = series.covered_days();
        if covered < self.min_allowed_days {
            return Err(EngineError::InsufficientData {
                days: covered,
                required: self.min_allowed_days,
            });
        }
        debug!(resource_id = %series.resource_id, days = covered, "series loaded");
        Ok(series)
    }
}
