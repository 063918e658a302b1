//! Multi-period trend aggregation
//!
//! Reduces classified activity periods to per-metric statistical trends:
//! a 10th-through-90th percentile ladder, mean and spread. An instance
//! with several materially distinct usage regimes ("non-straight"
//! periods) gets one trend per qualifying band, each stamped with its
//! share of total samples; otherwise the qualifying bands are merged
//! into a single trend.

use crate::models::{MetricAttribute, MetricSample, ResizeDirection, Shape, ABSENT_METRIC};
use crate::pipeline::classify::{BandedPeriods, UtilizationBand};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Round to two decimals, the precision probabilities are reported at
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Trend aggregation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Share of total series length a band needs to count as a distinct
    /// usage regime
    pub non_straight_min_share: f64,
    /// Whether workload-split recommendations may be produced at all
    pub allow_split: bool,
    /// Target utilization band for provisioned capacity
    pub utilization_floor: f64,
    pub utilization_ceiling: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            non_straight_min_share: 0.05,
            allow_split: true,
            utilization_floor: 0.3,
            utilization_ceiling: 0.7,
        }
    }
}

/// Statistics for one metric over an analyzed period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub attribute: MetricAttribute,
    /// p10, p20, ... p90
    pub percentiles: [f64; 9],
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
}

impl MetricTrend {
    pub fn from_values(attribute: MetricAttribute, values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut percentiles = [0.0; 9];
        for (i, slot) in percentiles.iter_mut().enumerate() {
            *slot = percentile_sorted(&sorted, (i as f64 + 1.0) * 10.0);
        }

        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        let variance = if values.len() < 2 {
            0.0
        } else {
            values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                / (values.len() - 1) as f64
        };

        Self {
            attribute,
            percentiles,
            mean,
            variance,
            std_dev: variance.sqrt(),
        }
    }

    /// A metric whose mean is exactly the absent sentinel was never
    /// collected and imposes no constraint.
    pub fn has_signal(&self) -> bool {
        (self.mean - ABSENT_METRIC).abs() > f64::EPSILON
    }

    pub fn p10(&self) -> f64 {
        self.percentiles[0]
    }

    pub fn p90(&self) -> f64 {
        self.percentiles[8]
    }

    /// Demand in absolute units at each percentile, scaled off the
    /// current shape for percentage metrics. `None` when the current
    /// shape does not provision this metric.
    pub fn absolute_percentiles(&self, current: &Shape) -> Option<[f64; 9]> {
        if self.attribute.is_relative() {
            let capacity = current.capacity(self.attribute)?;
            let mut scaled = [0.0; 9];
            for (slot, p) in scaled.iter_mut().zip(self.percentiles.iter()) {
                *slot = p / 100.0 * capacity;
            }
            Some(scaled)
        } else {
            Some(self.percentiles)
        }
    }

    /// Peak-demand utilization fraction of the current shape
    pub fn current_utilization(&self, current: &Shape) -> Option<f64> {
        if self.attribute.is_relative() {
            Some(self.p90() / 100.0)
        } else {
            let capacity = current.capacity(self.attribute)?;
            if capacity <= 0.0 {
                return None;
            }
            Some(self.p90() / capacity)
        }
    }
}

/// Derived statistics for one activity regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub metrics: Vec<MetricTrend>,
    /// Share of total samples; `None` for the single merged-period trend
    pub probability: Option<f64>,
    /// Set once soft (network/IOPS) constraints have been dropped
    pub optional_discarded: bool,
}

impl Trend {
    pub fn compute(
        rows: &[MetricSample],
        attributes: &[MetricAttribute],
        probability: Option<f64>,
    ) -> Self {
        let metrics = attributes
            .iter()
            .map(|attr| {
                let values: Vec<f64> = rows.iter().map(|r| attr.value(r)).collect();
                MetricTrend::from_values(*attr, &values)
            })
            .collect();
        Self {
            metrics,
            probability,
            optional_discarded: false,
        }
    }

    pub fn metric(&self, attribute: MetricAttribute) -> Option<&MetricTrend> {
        self.metrics.iter().find(|m| m.attribute == attribute)
    }

    /// Metrics that actually carry signal
    pub fn live_metrics(&self) -> impl Iterator<Item = &MetricTrend> {
        self.metrics.iter().filter(|m| m.has_signal())
    }

    /// True unless every collected metric already sits inside the
    /// current shape's target utilization band.
    pub fn requires_resize(&self, current: &Shape, config: &TrendConfig) -> bool {
        self.directions(current, config)
            .iter()
            .any(|(_, d)| *d != ResizeDirection::Keep)
    }

    /// Per-metric resize verdicts against the current shape
    pub fn directions(
        &self,
        current: &Shape,
        config: &TrendConfig,
    ) -> Vec<(MetricAttribute, ResizeDirection)> {
        self.live_metrics()
            .filter_map(|m| {
                let utilization = m.current_utilization(current)?;
                let direction = if utilization > config.utilization_ceiling {
                    ResizeDirection::Up
                } else if utilization < config.utilization_floor {
                    ResizeDirection::Down
                } else {
                    ResizeDirection::Keep
                };
                Some((m.attribute, direction))
            })
            .collect()
    }

    /// A relaxed copy with the soft (network/IOPS) requirements dropped.
    /// Used only as a fallback inside the resize matcher; pure so the
    /// matcher's recursion stays side-effect-free.
    pub fn without_optional_requirements(&self) -> Trend {
        Trend {
            metrics: self
                .metrics
                .iter()
                .filter(|m| !m.attribute.is_optional())
                .cloned()
                .collect(),
            probability: self.probability,
            optional_discarded: true,
        }
    }
}

/// Aggregate classified periods into one or several trends.
///
/// Multi-trend ("non-straight") analysis applies when at least two
/// active bands each clear the share bar and splits are allowed; trends
/// with identical per-metric resize directions collapse to one.
pub fn aggregate(
    bands: &BandedPeriods,
    total_rows: usize,
    all_rows: &[MetricSample],
    current: &Shape,
    attributes: &[MetricAttribute],
    config: &TrendConfig,
) -> Vec<Trend> {
    let qualifying: Vec<UtilizationBand> = UtilizationBand::ACTIVE
        .iter()
        .copied()
        .filter(|band| {
            total_rows > 0
                && bands.band_rows(*band) as f64 / total_rows as f64
                    >= config.non_straight_min_share
        })
        .collect();

    if !config.allow_split || qualifying.len() <= 1 {
        let mut rows: Vec<MetricSample> = qualifying
            .iter()
            .flat_map(|band| bands.concat_band(*band))
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        if rows.is_empty() {
            rows = all_rows.to_vec();
        }
        return vec![Trend::compute(&rows, attributes, None)];
    }

    let mut trends: Vec<Trend> = Vec::new();
    for band in qualifying {
        let rows = bands.concat_band(band);
        let probability = round2(rows.len() as f64 / total_rows as f64);
        let trend = Trend::compute(&rows, attributes, Some(probability));

        let duplicate = trends
            .iter()
            .any(|t| t.directions(current, config) == trend.directions(current, config));
        if duplicate {
            debug!(?band, "dropping trend with duplicate resize directions");
            continue;
        }
        trends.push(trend);
    }
    trends
}

/// Nearest-rank percentile over pre-sorted values
pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cloud;
    use crate::pipeline::classify::PeriodFrame;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_at(minute: i64, cpu: f64, mem: f64) -> MetricSample {
        MetricSample {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            cpu_load: cpu,
            memory_load: mem,
            net_output_load: -1.0,
            avg_disk_iops: -1.0,
            max_disk_iops: -1.0,
        }
    }

    fn shape(cpu: u32, memory_gib: f64) -> Shape {
        Shape {
            name: "m5.large".into(),
            cloud: Cloud::Aws,
            cpu,
            memory_gib,
            network_gbps: None,
            iops: None,
            family_type: "general".into(),
            series: "m5".into(),
        }
    }

    fn attrs() -> Vec<MetricAttribute> {
        MetricAttribute::DEFAULT_SET.to_vec()
    }

    fn period(band: UtilizationBand, start_minute: i64, count: usize, cpu: f64) -> PeriodFrame {
        PeriodFrame {
            band,
            rows: (0..count)
                .map(|i| sample_at(start_minute + i as i64 * 30, cpu, cpu))
                .collect(),
        }
    }

    #[test]
    fn test_percentile_ladder() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let trend = MetricTrend::from_values(MetricAttribute::CpuLoad, &values);
        assert!((trend.p10() - 11.0).abs() <= 1.0);
        assert!((trend.p90() - 90.0).abs() <= 1.0);
        assert!((trend.mean - 50.5).abs() < 1e-9);
        assert!(trend.std_dev > 0.0);
    }

    #[test]
    fn test_absent_metric_has_no_signal() {
        let trend = MetricTrend::from_values(MetricAttribute::AvgDiskIops, &[-1.0, -1.0, -1.0]);
        assert!(!trend.has_signal());
        let live = MetricTrend::from_values(MetricAttribute::AvgDiskIops, &[-1.0, 10.0]);
        assert!(live.has_signal());
    }

    #[test]
    fn test_requires_resize_inside_band() {
        let rows: Vec<_> = (0..48).map(|i| sample_at(i * 30, 50.0, 50.0)).collect();
        let trend = Trend::compute(&rows, &attrs(), None);
        let config = TrendConfig::default();
        // 50% utilization sits inside [30%, 70%]
        assert!(!trend.requires_resize(&shape(2, 8.0), &config));
    }

    #[test]
    fn test_requires_resize_when_underutilized() {
        let rows: Vec<_> = (0..48).map(|i| sample_at(i * 30, 5.0, 5.0)).collect();
        let trend = Trend::compute(&rows, &attrs(), None);
        let config = TrendConfig::default();
        assert!(trend.requires_resize(&shape(2, 8.0), &config));
        let directions = trend.directions(&shape(2, 8.0), &config);
        assert!(directions
            .iter()
            .all(|(_, d)| *d == ResizeDirection::Down));
    }

    #[test]
    fn test_relaxation_is_pure() {
        let rows: Vec<_> = (0..48)
            .map(|i| {
                let mut s = sample_at(i * 30, 80.0, 40.0);
                s.avg_disk_iops = 500.0;
                s
            })
            .collect();
        let trend = Trend::compute(&rows, &attrs(), None);
        let relaxed = trend.without_optional_requirements();

        assert!(relaxed.optional_discarded);
        assert!(relaxed.metric(MetricAttribute::AvgDiskIops).is_none());
        // The original keeps its soft constraints
        assert!(!trend.optional_discarded);
        assert!(trend.metric(MetricAttribute::AvgDiskIops).is_some());
    }

    #[test]
    fn test_single_trend_when_one_band_qualifies() {
        let mut bands = BandedPeriods::default();
        bands.medium.push(period(UtilizationBand::Medium, 0, 90, 50.0));
        bands.low.push(period(UtilizationBand::Low, 3000, 2, 15.0));

        let trends = aggregate(
            &bands,
            100,
            &[],
            &shape(2, 8.0),
            &attrs(),
            &TrendConfig::default(),
        );
        assert_eq!(trends.len(), 1);
        assert!(trends[0].probability.is_none());
        // Only the qualifying medium band feeds the trend
        assert_eq!(
            trends[0].metric(MetricAttribute::CpuLoad).unwrap().mean,
            50.0
        );
    }

    #[test]
    fn test_multi_trend_probabilities() {
        let mut bands = BandedPeriods::default();
        bands.low.push(period(UtilizationBand::Low, 0, 60, 5.0));
        bands.high.push(period(UtilizationBand::High, 3000, 40, 90.0));

        let trends = aggregate(
            &bands,
            100,
            &[],
            &shape(2, 8.0),
            &attrs(),
            &TrendConfig::default(),
        );
        assert_eq!(trends.len(), 2);
        let probabilities: Vec<f64> = trends.iter().map(|t| t.probability.unwrap()).collect();
        assert!(probabilities.contains(&0.6));
        assert!(probabilities.contains(&0.4));
    }

    #[test]
    fn test_duplicate_directions_deduplicated() {
        // Both bands over-utilize CPU on this 1-vCPU shape: identical
        // resize directions, so only one trend survives.
        let mut bands = BandedPeriods::default();
        bands.medium.push(period(UtilizationBand::Medium, 0, 50, 80.0));
        bands.high.push(period(UtilizationBand::High, 3000, 50, 95.0));

        let trends = aggregate(
            &bands,
            100,
            &[],
            &shape(1, 1.0),
            &attrs(),
            &TrendConfig::default(),
        );
        assert_eq!(trends.len(), 1);
    }

    #[test]
    fn test_fallback_to_whole_series() {
        let bands = BandedPeriods::default();
        let rows: Vec<_> = (0..10).map(|i| sample_at(i * 30, 4.0, 4.0)).collect();
        let trends = aggregate(
            &bands,
            10,
            &rows,
            &shape(2, 8.0),
            &attrs(),
            &TrendConfig::default(),
        );
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].metric(MetricAttribute::CpuLoad).unwrap().mean, 4.0);
    }

    #[test]
    fn test_split_disallowed_merges() {
        let mut bands = BandedPeriods::default();
        bands.low.push(period(UtilizationBand::Low, 0, 60, 15.0));
        bands.high.push(period(UtilizationBand::High, 3000, 40, 90.0));

        let config = TrendConfig {
            allow_split: false,
            ..TrendConfig::default()
        };
        let trends = aggregate(&bands, 100, &[], &shape(2, 8.0), &attrs(), &config);
        assert_eq!(trends.len(), 1);
        assert!(trends[0].probability.is_none());
    }
}
