//! Recommendation engine for cloud compute rightsizing
//!
//! This crate turns per-resource utilization telemetry into a bounded,
//! explainable set of cost and performance recommendations:
//! - Day-level clustering and utilization banding of metric series
//! - Multi-period trend aggregation
//! - Shape-matching resize search with feedback-aware narrowing
//! - Run-time schedule synthesis from idle rhythms
//! - History tracking that keeps repeated scans idempotent

pub mod catalog;
pub mod error;
pub mod history;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod pricing;
pub mod recommend;
pub mod report;
pub mod series;
pub mod settings;

pub use catalog::{InMemoryCatalog, ShapeCatalog};
pub use error::EngineError;
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use models::*;
pub use observability::EngineMetrics;
pub use pricing::{
    FlatSavings, PricingSource, PurchaseContext, SavingsCalculator, SavingsRecord, StaticPricing,
};
pub use recommend::{GroupRecommendation, RecommendationEngine, ResourceContext};
pub use report::{
    RecommendationBody, RecommendationRecord, RecommendationStats, RecommendationStatus,
    ReportWriter, ResourceMeta, Severity,
};
pub use series::MetricSeries;
pub use settings::EngineSettings;
