//! Utilization banding of clustered days
//!
//! Buckets each day's clusters into shutdown/low/medium/high bands by
//! the CPU element of the cluster centroid, splits each cluster's rows
//! into contiguous period frames, and flattens same-band frames across
//! days into one list per band.

use crate::models::MetricSample;
use crate::pipeline::cluster::ClusterAssignment;
use crate::pipeline::segment::DayFrame;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Utilization bands, ordered by load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationBand {
    Shutdown,
    Low,
    Medium,
    High,
}

impl UtilizationBand {
    pub const ACTIVE: [UtilizationBand; 3] = [
        UtilizationBand::Low,
        UtilizationBand::Medium,
        UtilizationBand::High,
    ];

    /// Classify a centroid CPU load against `[t0, t1, t2]`. Every value
    /// lands in exactly one band.
    pub fn from_cpu(cpu: f64, thresholds: &BandThresholds) -> Self {
        let [t0, t1, t2] = thresholds.0;
        if cpu < t0 {
            UtilizationBand::Shutdown
        } else if cpu < t1 {
            UtilizationBand::Low
        } else if cpu < t2 {
            UtilizationBand::Medium
        } else {
            UtilizationBand::High
        }
    }
}

/// CPU-load thresholds separating the four bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandThresholds(pub [f64; 3]);

impl Default for BandThresholds {
    fn default() -> Self {
        Self([10.0, 30.0, 70.0])
    }
}

/// Classifier parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub thresholds: BandThresholds,
    /// Contiguous runs shorter than this are discarded
    pub min_period_minutes: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            thresholds: BandThresholds::default(),
            min_period_minutes: 30,
        }
    }
}

/// A contiguous run of same-band rows within one day
#[derive(Debug, Clone)]
pub struct PeriodFrame {
    pub band: UtilizationBand,
    pub rows: Vec<MetricSample>,
}

impl PeriodFrame {
    pub fn time_from(&self) -> DateTime<Utc> {
        self.rows[0].timestamp
    }

    /// Exclusive end: one step past the last covered sample
    pub fn time_to(&self, step_minutes: u32) -> DateTime<Utc> {
        self.rows[self.rows.len() - 1].timestamp + Duration::minutes(i64::from(step_minutes))
    }

    pub fn duration_minutes(&self, step_minutes: u32) -> u32 {
        self.rows.len() as u32 * step_minutes
    }
}

/// Same-band period frames flattened across all analyzed days.
///
/// Frames are kept as separate lists per band; callers concatenate rows
/// only when they need one unified frame (the single-trend path).
#[derive(Debug, Clone, Default)]
pub struct BandedPeriods {
    pub shutdown: Vec<PeriodFrame>,
    pub low: Vec<PeriodFrame>,
    pub medium: Vec<PeriodFrame>,
    pub high: Vec<PeriodFrame>,
    /// Raw-unit centroids of every meaningful cluster seen
    pub centroids: Vec<Vec<f64>>,
}

impl BandedPeriods {
    pub fn band(&self, band: UtilizationBand) -> &[PeriodFrame] {
        match band {
            UtilizationBand::Shutdown => &self.shutdown,
            UtilizationBand::Low => &self.low,
            UtilizationBand::Medium => &self.medium,
            UtilizationBand::High => &self.high,
        }
    }

    fn band_mut(&mut self, band: UtilizationBand) -> &mut Vec<PeriodFrame> {
        match band {
            UtilizationBand::Shutdown => &mut self.shutdown,
            UtilizationBand::Low => &mut self.low,
            UtilizationBand::Medium => &mut self.medium,
            UtilizationBand::High => &mut self.high,
        }
    }

    /// Total row count within one band
    pub fn band_rows(&self, band: UtilizationBand) -> usize {
        self.band(band).iter().map(|p| p.rows.len()).sum()
    }

    /// Rows of every active (non-shutdown) band
    pub fn active_rows(&self) -> usize {
        UtilizationBand::ACTIVE
            .iter()
            .map(|b| self.band_rows(*b))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shutdown.is_empty()
            && self.low.is_empty()
            && self.medium.is_empty()
            && self.high.is_empty()
    }

    /// Concatenated rows of one band, in timestamp order
    pub fn concat_band(&self, band: UtilizationBand) -> Vec<MetricSample> {
        let mut rows: Vec<MetricSample> = self
            .band(band)
            .iter()
            .flat_map(|p| p.rows.iter().copied())
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        rows
    }
}

/// Classify one clustered day into band period frames, appending into
/// the cross-day accumulator.
pub fn classify_day(
    frame: &DayFrame,
    assignment: &ClusterAssignment,
    config: &ClassifierConfig,
    step_minutes: u32,
    out: &mut BandedPeriods,
) {
    for (cluster_id, centroid) in assignment.centroids.iter().enumerate() {
        let centroid = match centroid {
            Some(c) if !c.is_empty() => c,
            // No signal for this cluster; skipped, never treated as zero
            _ => continue,
        };
        let band = UtilizationBand::from_cpu(centroid[0], &config.thresholds);

        let rows: Vec<MetricSample> = frame
            .rows
            .iter()
            .zip(&assignment.labels)
            .filter(|(_, label)| **label == cluster_id)
            .map(|(row, _)| *row)
            .collect();

        for run in contiguous_runs(&rows, step_minutes) {
            let period = PeriodFrame { band, rows: run };
            if period.duration_minutes(step_minutes) >= config.min_period_minutes {
                out.band_mut(band).push(period);
            }
        }
        out.centroids.push(centroid.clone());
    }
}

/// Classify a whole segmented, clustered window
pub fn classify_days(
    frames: &[DayFrame],
    assignments: &[ClusterAssignment],
    config: &ClassifierConfig,
    step_minutes: u32,
) -> BandedPeriods {
    let mut out = BandedPeriods::default();
    for (frame, assignment) in frames.iter().zip(assignments) {
        classify_day(frame, assignment, config, step_minutes, &mut out);
    }
    out
}

/// Split rows (already in timestamp order) into maximal contiguous runs
/// at the sampling step
fn contiguous_runs(rows: &[MetricSample], step_minutes: u32) -> Vec<Vec<MetricSample>> {
    let step = Duration::minutes(i64::from(step_minutes));
    let mut runs = Vec::new();
    let mut current: Vec<MetricSample> = Vec::new();
    for row in rows {
        if let Some(last) = current.last() {
            if row.timestamp - last.timestamp > step {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push(*row);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_at(minute: i64, cpu: f64) -> MetricSample {
        MetricSample {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            cpu_load: cpu,
            memory_load: cpu,
            net_output_load: -1.0,
            avg_disk_iops: -1.0,
            max_disk_iops: -1.0,
        }
    }

    #[test]
    fn test_banding_totality() {
        let thresholds = BandThresholds([10.0, 30.0, 70.0]);
        let cases = [
            (0.0, UtilizationBand::Shutdown),
            (9.99, UtilizationBand::Shutdown),
            (10.0, UtilizationBand::Low),
            (29.99, UtilizationBand::Low),
            (30.0, UtilizationBand::Medium),
            (69.99, UtilizationBand::Medium),
            (70.0, UtilizationBand::High),
            (100.0, UtilizationBand::High),
        ];
        for (cpu, expected) in cases {
            assert_eq!(UtilizationBand::from_cpu(cpu, &thresholds), expected, "cpu={cpu}");
        }
    }

    #[test]
    fn test_none_centroid_skipped() {
        let rows: Vec<_> = (0..8).map(|i| sample_at(i * 30, 50.0)).collect();
        let frame = DayFrame {
            date: rows[0].timestamp.date_naive(),
            rows,
        };
        let assignment = ClusterAssignment {
            labels: vec![0; 8],
            centroids: vec![Some(vec![50.0]), None],
        };
        let mut out = BandedPeriods::default();
        classify_day(&frame, &assignment, &ClassifierConfig::default(), 30, &mut out);
        assert_eq!(out.medium.len(), 1);
        assert_eq!(out.centroids.len(), 1);
        assert!(out.shutdown.is_empty());
    }

    #[test]
    fn test_scattered_cluster_splits_into_runs() {
        // Cluster 0 at minutes 0-60 and 180-240, cluster 1 between
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..9 {
            let minute = i * 30;
            let in_gap = (90..=150).contains(&minute);
            rows.push(sample_at(minute, if in_gap { 80.0 } else { 5.0 }));
            labels.push(usize::from(in_gap));
        }
        let frame = DayFrame {
            date: rows[0].timestamp.date_naive(),
            rows,
        };
        let assignment = ClusterAssignment {
            labels,
            centroids: vec![Some(vec![5.0]), Some(vec![80.0])],
        };
        let mut out = BandedPeriods::default();
        classify_day(&frame, &assignment, &ClassifierConfig::default(), 30, &mut out);

        assert_eq!(out.shutdown.len(), 2, "idle rows split around the active gap");
        assert_eq!(out.high.len(), 1);
        assert_eq!(out.band_rows(UtilizationBand::Shutdown), 6);
    }

    #[test]
    fn test_short_periods_filtered() {
        let rows = vec![sample_at(0, 50.0)];
        let frame = DayFrame {
            date: rows[0].timestamp.date_naive(),
            rows,
        };
        let assignment = ClusterAssignment {
            labels: vec![0],
            centroids: vec![Some(vec![50.0])],
        };
        let config = ClassifierConfig {
            min_period_minutes: 60,
            ..ClassifierConfig::default()
        };
        let mut out = BandedPeriods::default();
        classify_day(&frame, &assignment, &config, 30, &mut out);
        assert!(out.is_empty());
        // The cluster still contributes its centroid
        assert_eq!(out.centroids.len(), 1);
    }

    #[test]
    fn test_band_row_accounting() {
        let rows: Vec<_> = (0..10).map(|i| sample_at(i * 30, if i < 4 { 5.0 } else { 90.0 })).collect();
        let frame = DayFrame {
            date: rows[0].timestamp.date_naive(),
            rows,
        };
        let assignment = ClusterAssignment {
            labels: vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 1],
            centroids: vec![Some(vec![5.0]), Some(vec![90.0])],
        };
        let out = classify_days(
            std::slice::from_ref(&frame),
            std::slice::from_ref(&assignment),
            &ClassifierConfig::default(),
            30,
        );
        assert_eq!(out.band_rows(UtilizationBand::Shutdown), 4);
        assert_eq!(out.band_rows(UtilizationBand::High), 6);
        assert_eq!(out.active_rows(), 6);
    }
}
