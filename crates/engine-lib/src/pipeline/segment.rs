//! Calendar-day segmentation
//!
//! Splits a cleaned series into day frames and trims incomplete boundary
//! days. Older windows are checked at a coarser step, since aged-out data
//! is stored downsampled and "a full day" means fewer samples there.

use crate::models::MetricSample;
use crate::series::MetricSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Below this many day groups edge-trimming is skipped: with so little
/// data, dropping boundary days costs more than partial days distort.
pub const MIN_DAYS_FOR_EDGE_TRIM: usize = 14;

/// One calendar day slice of a metric series
#[derive(Debug, Clone)]
pub struct DayFrame {
    pub date: NaiveDate,
    pub rows: Vec<MetricSample>,
}

/// Segmentation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Nominal sample step for recent data
    pub step_minutes: u32,
    /// Age in days beyond which the first day is held to the coarser step
    pub optimized_threshold_days: i64,
    /// Step the aged-out portion of the series is stored at
    pub optimized_step_minutes: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            step_minutes: 5,
            optimized_threshold_days: 30,
            optimized_step_minutes: 30,
        }
    }
}

/// Split a series into day frames, trimming incomplete boundary days.
///
/// With fewer than [`MIN_DAYS_FOR_EDGE_TRIM`] day groups all groups are
/// returned unmodified unless `force_edge_trim` is set. An empty series
/// yields an empty list; callers treat that as insufficient data.
pub fn segment(
    series: &MetricSeries,
    config: &SegmenterConfig,
    force_edge_trim: bool,
) -> Vec<DayFrame> {
    let mut groups: BTreeMap<NaiveDate, Vec<MetricSample>> = BTreeMap::new();
    for sample in series.samples() {
        groups
            .entry(sample.timestamp.date_naive())
            .or_default()
            .push(*sample);
    }

    let mut frames: Vec<DayFrame> = groups
        .into_iter()
        .map(|(date, rows)| DayFrame { date, rows })
        .collect();

    if frames.is_empty() {
        return frames;
    }
    if frames.len() < MIN_DAYS_FOR_EDGE_TRIM && !force_edge_trim {
        return frames;
    }

    let full_day = samples_per_day(config.step_minutes);
    if frames.last().map(|f| f.rows.len() < full_day).unwrap_or(false) {
        let dropped = frames.pop();
        debug!(
            date = %dropped.map(|f| f.date.to_string()).unwrap_or_default(),
            "dropped incomplete trailing day"
        );
    }

    if frames.len() > 1 {
        let span_days = (frames[frames.len() - 1].date - frames[0].date).num_days();
        let first_step = if span_days > config.optimized_threshold_days {
            config.optimized_step_minutes
        } else {
            config.step_minutes
        };
        let full_first_day = samples_per_day(first_step);
        if frames[0].rows.len() < full_first_day {
            let dropped = frames.remove(0);
            debug!(date = %dropped.date, "dropped incomplete leading day");
        }
    }

    frames
}

fn samples_per_day(step_minutes: u32) -> usize {
    (24 * 60 / step_minutes.max(1)) as usize
}
