//! Engine settings
//!
//! One deserializable bundle of every component's tunables, with
//! defaults matching the production profile. The scanner loads this
//! from its config file; tests construct it directly.

use crate::error::EngineError;
use crate::models::MetricAttribute;
use crate::pipeline::classify::ClassifierConfig;
use crate::pipeline::cluster::ClustererConfig;
use crate::pipeline::segment::SegmenterConfig;
use crate::pipeline::trend::TrendConfig;
use crate::recommend::resize::MatcherConfig;
use crate::recommend::schedule::ScheduleConfig;
use serde::{Deserialize, Serialize};

/// Everything the recommendation engine can be tuned with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Coverage below this yields an "insufficient" report
    pub min_allowed_days: u32,
    /// Analysis window; older samples are discarded up front
    pub max_days: u32,
    /// Metric columns to analyze; CPU load must stay first
    pub metric_attributes: Vec<MetricAttribute>,
    pub segmenter: SegmenterConfig,
    pub clusterer: ClustererConfig,
    pub classifier: ClassifierConfig,
    pub trend: TrendConfig,
    pub matcher: MatcherConfig,
    pub schedule: ScheduleConfig,
    pub allow_shutdown: bool,
    pub allow_schedule: bool,
    pub allow_resize: bool,
    /// Rank priced candidates cheapest-first instead of by search order
    pub sort_by_price: bool,
    pub ignore_savings: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_allowed_days: 14,
            max_days: 90,
            metric_attributes: MetricAttribute::DEFAULT_SET.to_vec(),
            segmenter: SegmenterConfig::default(),
            clusterer: ClustererConfig::default(),
            classifier: ClassifierConfig::default(),
            trend: TrendConfig::default(),
            matcher: MatcherConfig::default(),
            schedule: ScheduleConfig::default(),
            allow_shutdown: true,
            allow_schedule: true,
            allow_resize: true,
            sort_by_price: false,
            ignore_savings: false,
        }
    }
}

impl EngineSettings {
    /// Reject inconsistent tunings before any resource is processed
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.metric_attributes.first() != Some(&MetricAttribute::CpuLoad) {
            return Err(EngineError::InvalidConfig(
                "metric_attributes must start with cpu_load".into(),
            ));
        }
        let [t0, t1, t2] = self.classifier.thresholds.0;
        if !(t0 < t1 && t1 < t2) {
            return Err(EngineError::InvalidConfig(format!(
                "band thresholds must be strictly ascending, got [{t0}, {t1}, {t2}]"
            )));
        }
        if self.trend.utilization_floor >= self.trend.utilization_ceiling {
            return Err(EngineError::InvalidConfig(
                "utilization floor must be below the ceiling".into(),
            ));
        }
        if self.matcher.max_results == 0 {
            return Err(EngineError::InvalidConfig(
                "max_results must be positive".into(),
            ));
        }
        if self.schedule.record_step_minutes == 0 || 24 * 60 % self.schedule.record_step_minutes != 0
        {
            return Err(EngineError::InvalidConfig(
                "record_step_minutes must evenly divide a day".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        EngineSettings::default().validate().unwrap();
    }

    #[test]
    fn test_bad_thresholds_rejected() {
        let mut settings = EngineSettings::default();
        settings.classifier.thresholds.0 = [30.0, 10.0, 70.0];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_cpu_must_lead() {
        let mut settings = EngineSettings::default();
        settings.metric_attributes = vec![MetricAttribute::MemoryLoad, MetricAttribute::CpuLoad];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_step_must_divide_day() {
        let mut settings = EngineSettings::default();
        settings.schedule.record_step_minutes = 7;
        assert!(settings.validate().is_err());
    }
}
