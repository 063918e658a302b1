//! Core data models for the recommendation engine

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Sentinel stored for metrics that were never collected for a resource
pub const ABSENT_METRIC: f64 = -1.0;

/// All seven weekdays, Monday first
pub const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// One utilization sample at the nominal collection frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_load: f64,
    pub memory_load: f64,
    pub net_output_load: f64,
    pub avg_disk_iops: f64,
    pub max_disk_iops: f64,
}

/// Metric columns the engine analyzes, in centroid order (CPU first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricAttribute {
    CpuLoad,
    MemoryLoad,
    NetOutputLoad,
    AvgDiskIops,
    MaxDiskIops,
}

impl MetricAttribute {
    /// Default analysis set; CPU load must stay first, the period
    /// classifier reads centroid element 0 as CPU.
    pub const DEFAULT_SET: [MetricAttribute; 5] = [
        MetricAttribute::CpuLoad,
        MetricAttribute::MemoryLoad,
        MetricAttribute::NetOutputLoad,
        MetricAttribute::AvgDiskIops,
        MetricAttribute::MaxDiskIops,
    ];

    pub fn value(&self, sample: &MetricSample) -> f64 {
        match self {
            MetricAttribute::CpuLoad => sample.cpu_load,
            MetricAttribute::MemoryLoad => sample.memory_load,
            MetricAttribute::NetOutputLoad => sample.net_output_load,
            MetricAttribute::AvgDiskIops => sample.avg_disk_iops,
            MetricAttribute::MaxDiskIops => sample.max_disk_iops,
        }
    }

    /// Value inserted when gap-filling a missing timestamp
    pub fn gap_fill_value(&self) -> f64 {
        match self {
            MetricAttribute::CpuLoad | MetricAttribute::MemoryLoad => 0.0,
            MetricAttribute::NetOutputLoad
            | MetricAttribute::AvgDiskIops
            | MetricAttribute::MaxDiskIops => ABSENT_METRIC,
        }
    }

    /// Soft constraints may be discarded when the matcher relaxes a trend
    pub fn is_optional(&self) -> bool {
        !matches!(
            self,
            MetricAttribute::CpuLoad | MetricAttribute::MemoryLoad
        )
    }

    /// True for percentage-of-provisioned metrics (as opposed to
    /// absolute counters like IOPS)
    pub fn is_relative(&self) -> bool {
        matches!(
            self,
            MetricAttribute::CpuLoad | MetricAttribute::MemoryLoad | MetricAttribute::NetOutputLoad
        )
    }
}

/// Clouds the shape catalog covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cloud {
    Aws,
    Azure,
    Gcp,
}

/// Resource kinds the engine recommends for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Instance,
    AutoscalingGroup,
}

/// Immutable shape catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    pub cloud: Cloud,
    pub cpu: u32,
    pub memory_gib: f64,
    /// Gbps; absent when the cloud does not publish it
    pub network_gbps: Option<f64>,
    pub iops: Option<f64>,
    pub family_type: String,
    /// Series prefix, e.g. "m5" for "m5.large"
    pub series: String,
}

impl Shape {
    /// Provisioned capacity for a metric, in the metric's absolute units
    pub fn capacity(&self, attribute: MetricAttribute) -> Option<f64> {
        match attribute {
            MetricAttribute::CpuLoad => Some(f64::from(self.cpu)),
            MetricAttribute::MemoryLoad => Some(self.memory_gib),
            MetricAttribute::NetOutputLoad => self.network_gbps,
            MetricAttribute::AvgDiskIops | MetricAttribute::MaxDiskIops => self.iops,
        }
    }
}

/// A catalog shape decorated with fit confidence and, later, price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateShape {
    #[serde(flatten)]
    pub shape: Shape,
    pub probability: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl CandidateShape {
    pub fn new(shape: Shape, probability: f64) -> Self {
        Self {
            shape,
            probability,
            price: None,
        }
    }
}

/// One weekly run-time window on the `record_step_minutes` grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// "HH:MM"
    pub start: String,
    /// "HH:MM"; "00:00" means end of day when it closes a window
    pub stop: String,
    pub weekdays: Vec<Weekday>,
    pub probability: f64,
}

impl ScheduleWindow {
    /// The "always run" sentinel: no shutdown schedule should be applied
    pub fn always_on() -> Self {
        Self {
            start: "00:00".to_string(),
            stop: "00:00".to_string(),
            weekdays: ALL_WEEKDAYS.to_vec(),
            probability: 1.0,
        }
    }

    pub fn is_always_on(&self) -> bool {
        self.start == "00:00" && self.stop == "00:00" && self.weekdays.len() == 7
    }
}

/// End-user-facing recommendation labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneralAction {
    Shutdown,
    Schedule,
    ScaleUp,
    ScaleDown,
    ChangeShape,
    Split,
    Empty,
    Error,
}

/// Operator verdicts on past recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackStatus {
    Applied,
    Wrong,
    TooLarge,
    TooSmall,
    DontRecommend,
    TooExpensive,
    TooWide,
}

/// History rows are keyed per recommendation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationType {
    Shutdown,
    Schedule,
    Resize,
    Split,
    GroupScale,
}

/// Direction the resize search moves in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResizeAction {
    ScaleUp,
    ScaleDown,
    ChangeShape,
    Split,
}

impl ResizeAction {
    pub fn general_action(&self) -> GeneralAction {
        match self {
            ResizeAction::ScaleUp => GeneralAction::ScaleUp,
            ResizeAction::ScaleDown => GeneralAction::ScaleDown,
            ResizeAction::ChangeShape => GeneralAction::ChangeShape,
            ResizeAction::Split => GeneralAction::Split,
        }
    }
}

/// Per-metric verdict against the current shape's provisioned range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeDirection {
    Up,
    Down,
    Keep,
}

/// Policy limiting resize candidates to related shape families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShapeCompatibility {
    None,
    Same,
    Compatible,
}

/// Persisted outcome of a group scan, reused verbatim during cooldown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupScaleDecision {
    pub action: GeneralAction,
    pub scale_step: u32,
    pub majority_instance_type: Option<String>,
}

/// Opaque recommendation payload stored in history rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum HistoryPayload {
    Shapes(Vec<CandidateShape>),
    Schedule(Vec<ScheduleWindow>),
    Group(GroupScaleDecision),
    None,
}

impl HistoryPayload {
    pub fn shapes(&self) -> &[CandidateShape] {
        match self {
            HistoryPayload::Shapes(shapes) => shapes,
            _ => &[],
        }
    }
}

/// Persistent record of an emitted recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationHistory {
    pub id: u64,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub recommendation_type: RecommendationType,
    pub recommendation: HistoryPayload,
    pub feedback: Option<FeedbackStatus>,
    pub added_at: DateTime<Utc>,
    pub last_metric_capture_date: Option<DateTime<Utc>>,
    pub savings: Option<f64>,
}

impl RecommendationHistory {
    /// A row is unresolved until an operator attaches feedback
    pub fn is_unresolved(&self) -> bool {
        self.feedback.is_none()
    }
}

/// Scale step for autoscaling-group recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleStep {
    Auto,
    Fixed(u32),
}

/// Aggregate load thresholds for a group, in load percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupThresholds {
    pub min: f64,
    pub desired: f64,
    pub max: f64,
}

/// Autoscaling-group policy, external configuration read-only to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPolicy {
    pub id: String,
    pub tag: String,
    pub scale_step: ScaleStep,
    pub cooldown_days: u32,
    pub thresholds: GroupThresholds,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> MetricSample {
        MetricSample {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
            cpu_load: 42.0,
            memory_load: 55.5,
            net_output_load: 10.0,
            avg_disk_iops: 120.0,
            max_disk_iops: 300.0,
        }
    }

    #[test]
    fn test_attribute_value_access() {
        let s = sample();
        assert_eq!(MetricAttribute::CpuLoad.value(&s), 42.0);
        assert_eq!(MetricAttribute::MaxDiskIops.value(&s), 300.0);
    }

    #[test]
    fn test_gap_fill_sentinels() {
        assert_eq!(MetricAttribute::CpuLoad.gap_fill_value(), 0.0);
        assert_eq!(MetricAttribute::MemoryLoad.gap_fill_value(), 0.0);
        assert_eq!(MetricAttribute::AvgDiskIops.gap_fill_value(), ABSENT_METRIC);
        assert_eq!(MetricAttribute::NetOutputLoad.gap_fill_value(), ABSENT_METRIC);
    }

    #[test]
    fn test_always_on_sentinel() {
        let window = ScheduleWindow::always_on();
        assert!(window.is_always_on());

        let weekday_only = ScheduleWindow {
            start: "00:00".into(),
            stop: "00:00".into(),
            weekdays: vec![Weekday::Mon, Weekday::Tue],
            probability: 1.0,
        };
        assert!(!weekday_only.is_always_on());
    }

    #[test]
    fn test_shape_capacity_lookup() {
        let shape = Shape {
            name: "m5.large".into(),
            cloud: Cloud::Aws,
            cpu: 2,
            memory_gib: 8.0,
            network_gbps: Some(10.0),
            iops: None,
            family_type: "general".into(),
            series: "m5".into(),
        };
        assert_eq!(shape.capacity(MetricAttribute::CpuLoad), Some(2.0));
        assert_eq!(shape.capacity(MetricAttribute::MemoryLoad), Some(8.0));
        assert_eq!(shape.capacity(MetricAttribute::AvgDiskIops), None);
    }

    #[test]
    fn test_candidate_dedup_is_whole_value() {
        let shape = Shape {
            name: "m5.large".into(),
            cloud: Cloud::Aws,
            cpu: 2,
            memory_gib: 8.0,
            network_gbps: None,
            iops: None,
            family_type: "general".into(),
            series: "m5".into(),
        };
        let a = CandidateShape::new(shape.clone(), 0.8);
        let b = CandidateShape::new(shape, 0.6);
        // Same name, different probability: distinct proposals
        assert_ne!(a, b);
    }
}
