//! Run-time schedule synthesis
//!
//! Builds a day-of-week by time-of-day shutdown frequency map from the
//! detected idle periods, derives per-weekday active windows that clear
//! a minimum duration and a stability bar, and merges near-duplicate
//! windows across weekdays into a compact weekly schedule.

use crate::history::is_schedule_forbidden;
use crate::models::{RecommendationHistory, ScheduleWindow, ALL_WEEKDAYS};
use crate::pipeline::classify::PeriodFrame;
use crate::pipeline::trend::round2;
use crate::series::MetricSeries;
use chrono::{Datelike, Duration, NaiveDate, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Schedule synthesis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Grid step of the schedule windows
    pub record_step_minutes: u32,
    /// Below this coverage the conservative "always run" sentinel wins
    pub min_allowed_days_schedule: u32,
    /// Data older than this is stale for rhythm detection
    pub max_allowed_days_schedule: u32,
    /// Shortest active window worth scheduling
    pub min_schedule_day_duration_minutes: u32,
    /// Share of a weekday's occurrences a bucket must be idle in to
    /// count as reliably shut down
    pub min_bucket_frequency_ratio: f64,
    /// Windows whose combined start/stop drift stays within this merge
    pub merge_tolerance_minutes: i64,
    pub max_windows: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            record_step_minutes: 30,
            min_allowed_days_schedule: 14,
            max_allowed_days_schedule: 60,
            min_schedule_day_duration_minutes: 120,
            min_bucket_frequency_ratio: 0.5,
            merge_tolerance_minutes: 60,
            max_windows: 5,
        }
    }
}

/// Candidate active window for one weekday, in grid buckets
#[derive(Debug, Clone)]
struct DayWindow {
    weekday: Weekday,
    start_bucket: usize,
    /// Exclusive
    end_bucket: usize,
    probability: f64,
}

/// Synthesize a weekly run-time schedule from detected shutdown periods.
///
/// An empty result means no stable shutdown rhythm was found. The
/// "always run" sentinel is returned when scheduling is forbidden by
/// feedback or coverage is too thin to trust a rhythm.
pub fn generate_schedule(
    shutdown_periods: &[PeriodFrame],
    config: &ScheduleConfig,
    series: &MetricSeries,
    past: &[RecommendationHistory],
) -> Vec<ScheduleWindow> {
    if is_schedule_forbidden(past) {
        debug!(resource_id = %series.resource_id, "schedule rejected by feedback");
        return vec![ScheduleWindow::always_on()];
    }

    let covered = series.covered_days();
    if covered < config.min_allowed_days_schedule {
        return vec![ScheduleWindow::always_on()];
    }

    // Stale data distorts rhythm detection; cut everything older than
    // the max window.
    let cutoff = if covered > config.max_allowed_days_schedule {
        series
            .last_timestamp()
            .map(|last| last - Duration::days(i64::from(config.max_allowed_days_schedule)))
    } else {
        None
    };

    let step = series.step_minutes;
    let fresh_periods: Vec<&PeriodFrame> = shutdown_periods
        .iter()
        .filter(|p| cutoff.map_or(true, |c| p.time_to(step) > c))
        .collect();
    if fresh_periods.is_empty() {
        return vec![];
    }

    let buckets_per_day = (24 * 60 / config.record_step_minutes) as usize;

    // Distinct weekday occurrences in the considered window
    let dates: BTreeSet<NaiveDate> = series
        .samples()
        .iter()
        .filter(|s| cutoff.map_or(true, |c| s.timestamp > c))
        .map(|s| s.timestamp.date_naive())
        .collect();
    let mut occurrences = [0u32; 7];
    for date in &dates {
        occurrences[date.weekday().num_days_from_monday() as usize] += 1;
    }

    // Shutdown frequency per (weekday, bucket); each date counts a
    // bucket at most once
    let mut seen: BTreeSet<(NaiveDate, usize)> = BTreeSet::new();
    for period in &fresh_periods {
        for row in &period.rows {
            if cutoff.map_or(false, |c| row.timestamp <= c) {
                continue;
            }
            let bucket =
                (row.timestamp.time().num_seconds_from_midnight() / 60 / config.record_step_minutes)
                    as usize;
            seen.insert((row.timestamp.date_naive(), bucket.min(buckets_per_day - 1)));
        }
    }
    let mut frequency = vec![[0u32; 7]; buckets_per_day];
    for (date, bucket) in &seen {
        frequency[*bucket][date.weekday().num_days_from_monday() as usize] += 1;
    }

    let mut day_windows: Vec<DayWindow> = Vec::new();
    for (day_idx, weekday) in ALL_WEEKDAYS.iter().enumerate() {
        let occ = occurrences[day_idx];
        if occ == 0 {
            continue;
        }
        let threshold =
            ((f64::from(occ) * config.min_bucket_frequency_ratio).ceil() as u32).max(1);

        let stable: Vec<bool> = (0..buckets_per_day)
            .map(|b| frequency[b][day_idx] >= threshold)
            .collect();

        for (start, end) in active_runs(&stable) {
            let minutes = (end - start) as u32 * config.record_step_minutes;
            if minutes < config.min_schedule_day_duration_minutes {
                continue;
            }
            let confidence = (start..end)
                .map(|b| 1.0 - f64::from(frequency[b][day_idx]) / f64::from(occ))
                .sum::<f64>()
                / (end - start) as f64;
            day_windows.push(DayWindow {
                weekday: *weekday,
                start_bucket: start,
                end_bucket: end,
                probability: confidence,
            });
        }
    }

    merge_windows(day_windows, buckets_per_day, config)
}

/// Maximal runs of non-stable (active) buckets as [start, end) pairs
fn active_runs(stable: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, is_stable) in stable.iter().enumerate() {
        match (is_stable, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, stable.len()));
    }
    runs
}

/// Merge same-or-similar windows across weekdays, rank by covered time
fn merge_windows(
    windows: Vec<DayWindow>,
    buckets_per_day: usize,
    config: &ScheduleConfig,
) -> Vec<ScheduleWindow> {
    let step = i64::from(config.record_step_minutes);

    struct Group {
        start_bucket: usize,
        end_bucket: usize,
        anchor_start: i64,
        anchor_stop: i64,
        weekdays: Vec<Weekday>,
        probabilities: Vec<f64>,
    }

    let mut groups: Vec<Group> = Vec::new();
    for window in windows {
        let start_min = window.start_bucket as i64 * step;
        let stop_min = window.end_bucket as i64 * step;

        let found = groups.iter_mut().find(|g| {
            (g.anchor_start == start_min && g.anchor_stop == stop_min)
                || (g.anchor_start - start_min).abs() + (g.anchor_stop - stop_min).abs()
                    <= config.merge_tolerance_minutes
        });
        match found {
            Some(group) => {
                // The merged window keeps the widest extent so no
                // member's active time becomes shutdown
                group.start_bucket = group.start_bucket.min(window.start_bucket);
                group.end_bucket = group.end_bucket.max(window.end_bucket);
                group.weekdays.push(window.weekday);
                group.probabilities.push(window.probability);
            }
            None => groups.push(Group {
                start_bucket: window.start_bucket,
                end_bucket: window.end_bucket,
                anchor_start: start_min,
                anchor_stop: stop_min,
                weekdays: vec![window.weekday],
                probabilities: vec![window.probability],
            }),
        }
    }

    groups.sort_by_key(|g| {
        let duration = (g.end_bucket - g.start_bucket) as i64 * step;
        std::cmp::Reverse(duration * g.weekdays.len() as i64)
    });
    groups.truncate(config.max_windows);

    groups
        .into_iter()
        .map(|g| {
            let probability =
                round2(g.probabilities.iter().sum::<f64>() / g.probabilities.len() as f64);
            ScheduleWindow {
                start: fmt_bucket(g.start_bucket, buckets_per_day, config.record_step_minutes),
                stop: fmt_bucket(g.end_bucket, buckets_per_day, config.record_step_minutes),
                weekdays: g.weekdays,
                probability,
            }
        })
        .collect()
}

/// Render a grid bucket boundary as "HH:MM"; the end-of-day boundary
/// renders as "00:00"
fn fmt_bucket(bucket: usize, buckets_per_day: usize, step_minutes: u32) -> String {
    let minutes = if bucket >= buckets_per_day {
        0
    } else {
        bucket as u32 * step_minutes
    };
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
