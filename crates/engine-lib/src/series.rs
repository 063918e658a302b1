//! Cleaned per-resource metric series
//!
//! A `MetricSeries` is the engine's only input signal: a time-ordered,
//! duplicate-free, gap-filled sample sequence at a fixed nominal step.
//! Construction enforces the invariants the pipeline relies on.

use crate::error::EngineError;
use crate::models::{Cloud, MetricAttribute, MetricSample, ResourceType};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Nominal collection frequency
pub const DEFAULT_STEP_MINUTES: u32 = 5;

/// Timestamp-indexed utilization series for one resource
#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub cloud: Cloud,
    /// Current shape name of the instance
    pub instance_type: String,
    pub step_minutes: u32,
    samples: Vec<MetricSample>,
}

impl MetricSeries {
    /// Build a series from raw merged samples: sorts, drops duplicate
    /// timestamps (last write wins) and gap-fills missing steps with the
    /// sentinel policy (0 for loads, -1 for absent network/IOPS).
    pub fn build(
        resource_id: impl Into<String>,
        resource_type: ResourceType,
        cloud: Cloud,
        instance_type: impl Into<String>,
        step_minutes: u32,
        mut samples: Vec<MetricSample>,
    ) -> Result<Self, EngineError> {
        if step_minutes == 0 {
            return Err(EngineError::InvalidConfig(
                "series step must be positive".into(),
            ));
        }
        if samples.is_empty() {
            return Err(EngineError::MalformedSeries("no samples".into()));
        }

        samples.sort_by_key(|s| s.timestamp);
        samples.reverse();
        let mut seen = BTreeSet::new();
        samples.retain(|s| seen.insert(s.timestamp));
        samples.reverse();

        let samples = gap_fill(samples, step_minutes);
        Ok(Self {
            resource_id: resource_id.into(),
            resource_type,
            cloud,
            instance_type: instance_type.into(),
            step_minutes,
            samples,
        })
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Number of distinct calendar days with at least one sample
    pub fn covered_days(&self) -> u32 {
        let dates: BTreeSet<_> = self.samples.iter().map(|s| s.timestamp.date_naive()).collect();
        dates.len() as u32
    }

    /// Drop samples at or before `cutoff`. Used to restart analysis after
    /// the most recent applied recommendation.
    pub fn trim_before(&mut self, cutoff: DateTime<Utc>) {
        self.samples.retain(|s| s.timestamp > cutoff);
    }

    /// Keep only the trailing `max_days` calendar days
    pub fn truncate_to_last_days(&mut self, max_days: u32) {
        if let Some(last) = self.last_timestamp() {
            let cutoff = last - Duration::days(i64::from(max_days));
            self.samples.retain(|s| s.timestamp > cutoff);
        }
    }
}

fn gap_fill(samples: Vec<MetricSample>, step_minutes: u32) -> Vec<MetricSample> {
    let step = Duration::minutes(i64::from(step_minutes));
    let mut filled = Vec::with_capacity(samples.len());
    let mut iter = samples.into_iter();
    let first = match iter.next() {
        Some(s) => s,
        None => return filled,
    };
    let mut expected = first.timestamp + step;
    filled.push(first);

    for sample in iter {
        while expected < sample.timestamp {
            filled.push(missing_sample(expected));
            expected += step;
        }
        expected = sample.timestamp + step;
        filled.push(sample);
    }
    filled
}

fn missing_sample(timestamp: DateTime<Utc>) -> MetricSample {
    MetricSample {
        timestamp,
        cpu_load: MetricAttribute::CpuLoad.gap_fill_value(),
        memory_load: MetricAttribute::MemoryLoad.gap_fill_value(),
        net_output_load: MetricAttribute::NetOutputLoad.gap_fill_value(),
        avg_disk_iops: MetricAttribute::AvgDiskIops.gap_fill_value(),
        max_disk_iops: MetricAttribute::MaxDiskIops.gap_fill_value(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::TimeZone;

    /// Flat-CPU series builder shared by the pipeline tests
    pub fn flat_series(days: u32, cpu_load: f64, step_minutes: u32) -> MetricSeries {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let per_day = (24 * 60 / step_minutes) as i64;
        let mut samples = Vec::new();
        for day in 0..i64::from(days) {
            for slot in 0..per_day {
                samples.push(MetricSample {
                    timestamp: start
                        + Duration::days(day)
                        + Duration::minutes(slot * i64::from(step_minutes)),
                    cpu_load,
                    memory_load: cpu_load,
                    net_output_load: -1.0,
                    avg_disk_iops: -1.0,
                    max_disk_iops: -1.0,
                });
            }
        }
        MetricSeries::build(
            "i-test",
            ResourceType::Instance,
            Cloud::Aws,
            "m5.large",
            step_minutes,
            samples,
        )
        .unwrap()
    }
}
