//! Per-resource analysis pipeline
//!
//! Segmentation into day frames, per-day clustering, utilization
//! banding, and trend aggregation. Each stage is a pure function over
//! the previous stage's output; the assembler wires them together.

pub mod classify;
pub mod cluster;
pub mod segment;
pub mod trend;

pub use classify::{
    BandThresholds, BandedPeriods, ClassifierConfig, PeriodFrame, UtilizationBand,
};
pub use cluster::{cluster, ClusterAssignment, ClustererConfig};
pub use segment::{segment, DayFrame, SegmenterConfig, MIN_DAYS_FOR_EDGE_TRIM};
pub use trend::{aggregate, MetricTrend, Trend, TrendConfig};
