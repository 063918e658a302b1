//! Per-resource recommendation assembly
//!
//! Drives the full pipeline for one resource and turns the signals into
//! a single recommendation record: segment, cluster, classify, trend,
//! schedule, resize, general-action selection, savings and history
//! persistence. Failures never cross the per-resource boundary; they
//! become ERROR records and the scan moves on.

use crate::catalog::ShapeCatalog;
use crate::error::EngineError;
use crate::history::{
    filter_applied, filter_resize, is_resize_forbidden, is_shutdown_forbidden, HistoryStore,
    NewHistory,
};
use crate::models::{
    CandidateShape, Cloud, GeneralAction, HistoryPayload, RecommendationHistory,
    RecommendationType, ResizeAction, ResizeDirection, ResourceType, ScheduleWindow, Shape,
};
use crate::observability::EngineMetrics;
use crate::pipeline::classify::{classify_days, BandedPeriods};
use crate::pipeline::cluster::{cluster, ClusterAssignment};
use crate::pipeline::segment::segment;
use crate::pipeline::trend::{aggregate, Trend, TrendConfig};
use crate::pricing::{PricingSource, PurchaseContext, SavingsCalculator, SavingsRecord};
use crate::recommend::resize::{ResizeMatcher, ResizeRequest};
use crate::recommend::schedule::generate_schedule;
use crate::report::{
    severity_for, RecommendationBody, RecommendationRecord, RecommendationStats,
    RecommendationStatus, ResourceMeta,
};
use crate::series::MetricSeries;
use crate::settings::EngineSettings;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Source tag stamped on every record this engine emits
pub const RECORD_SOURCE: &str = "rightsizer-engine";

/// Candidate probabilities of a split must cover the whole window
const SPLIT_PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Everything the engine needs to know about one resource
#[derive(Debug, Clone)]
pub struct ResourceContext {
    pub series: MetricSeries,
    pub meta: ResourceMeta,
}

/// The recommendation engine with its injected collaborators.
///
/// Constructed once at process start; collaborators are explicit
/// dependencies, never a hidden global registry.
pub struct RecommendationEngine {
    catalog: Arc<dyn ShapeCatalog>,
    pricing: Arc<dyn PricingSource>,
    savings: Arc<dyn SavingsCalculator>,
    history: Arc<dyn HistoryStore>,
    settings: EngineSettings,
    metrics: EngineMetrics,
}

struct PipelineOutcome {
    schedule: Vec<ScheduleWindow>,
    candidates: Vec<CandidateShape>,
    general_actions: Vec<GeneralAction>,
    savings: Option<SavingsRecord>,
    from_date: Option<DateTime<Utc>>,
    to_date: Option<DateTime<Utc>>,
}

impl RecommendationEngine {
    pub fn new(
        catalog: Arc<dyn ShapeCatalog>,
        pricing: Arc<dyn PricingSource>,
        savings: Arc<dyn SavingsCalculator>,
        history: Arc<dyn HistoryStore>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        Ok(Self {
            catalog,
            pricing,
            savings,
            history,
            settings,
            metrics: EngineMetrics::new(),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn history_store(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    /// Produce the recommendation record for one resource. Never fails:
    /// any error is folded into the record's status.
    pub fn recommend_resource(&self, ctx: ResourceContext) -> RecommendationRecord {
        let started = Instant::now();
        let resource_id = ctx.series.resource_id.clone();
        let resource_type = ctx.series.resource_type;
        let cloud = ctx.series.cloud;
        let meta = ctx.meta.clone();
        let from_date = ctx.series.first_timestamp();
        let to_date = ctx.series.last_timestamp();

        let record = match self.run_pipeline(ctx) {
            Ok(outcome) => {
                self.metrics.inc_recommendations();
                info!(
                    resource_id = %resource_id,
                    actions = ?outcome.general_actions,
                    "recommendation produced"
                );
                RecommendationRecord {
                    resource_id,
                    resource_type,
                    cloud,
                    source: RECORD_SOURCE.to_string(),
                    severity: severity_for(&outcome.general_actions),
                    recommendation: RecommendationBody {
                        schedule: outcome.schedule,
                        recommended_shapes: outcome.candidates,
                        savings: outcome.savings,
                        advanced: serde_json::Value::Null,
                    },
                    stats: RecommendationStats {
                        from_date: outcome.from_date,
                        to_date: outcome.to_date,
                        status: RecommendationStatus::Ok,
                        message: None,
                    },
                    meta,
                    general_actions: outcome.general_actions,
                }
            }
            Err(err) => self.failure_record(
                resource_id,
                resource_type,
                cloud,
                meta,
                from_date,
                to_date,
                &err,
            ),
        };
        self.metrics
            .observe_resource_latency(started.elapsed().as_secs_f64());
        record
    }

    /// Fold an error into a terminal record. Also used by the scanner
    /// when a resource fails before the engine is even reached.
    #[allow(clippy::too_many_arguments)]
    pub fn failure_record(
        &self,
        resource_id: String,
        resource_type: ResourceType,
        cloud: Cloud,
        meta: ResourceMeta,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
        err: &EngineError,
    ) -> RecommendationRecord {
        let (status, general_actions) = match err {
            EngineError::InsufficientData { .. } => {
                self.metrics.inc_insufficient();
                info!(resource_id = %resource_id, %err, "not enough coverage");
                (RecommendationStatus::Insufficient, vec![])
            }
            EngineError::Postponed(_) => {
                info!(resource_id = %resource_id, %err, "postponed");
                (RecommendationStatus::Postponed, vec![GeneralAction::Empty])
            }
            _ => {
                self.metrics.inc_failed();
                warn!(resource_id = %resource_id, %err, "resource failed");
                (RecommendationStatus::Error, vec![GeneralAction::Error])
            }
        };

        RecommendationRecord {
            resource_id,
            resource_type,
            cloud,
            source: RECORD_SOURCE.to_string(),
            severity: severity_for(&general_actions),
            recommendation: RecommendationBody::default(),
            stats: RecommendationStats {
                from_date,
                to_date,
                status,
                message: Some(err.to_string()),
            },
            meta,
            general_actions,
        }
    }

    fn run_pipeline(&self, ctx: ResourceContext) -> Result<PipelineOutcome, EngineError> {
        let ResourceContext { mut series, meta } = ctx;
        let settings = &self.settings;
        let resource_id = series.resource_id.clone();
        let resource_type = series.resource_type;

        let history_rows = self.history.list(&resource_id, resource_type);

        // Analysis restarts after the most recent applied recommendation
        if let Some(cutoff) = filter_applied(&history_rows)
            .iter()
            .filter_map(|r| r.last_metric_capture_date)
            .max()
        {
            series.trim_before(cutoff);
        }
        series.truncate_to_last_days(settings.max_days);

        let covered = series.covered_days();
        if covered < settings.min_allowed_days {
            return Err(EngineError::InsufficientData {
                days: covered,
                required: settings.min_allowed_days,
            });
        }

        let current_shape = self.catalog.get(&series.instance_type)?;

        let frames = segment(&series, &settings.segmenter, false);
        if frames.is_empty() {
            return Err(EngineError::InsufficientData {
                days: 0,
                required: settings.min_allowed_days,
            });
        }

        let assignments: Vec<ClusterAssignment> = frames
            .iter()
            .map(|f| cluster(f, &settings.metric_attributes, &settings.clusterer))
            .collect();
        let bands = classify_days(
            &frames,
            &assignments,
            &settings.classifier,
            series.step_minutes,
        );

        // Shares are relative to the analyzed window, which may be
        // smaller than the raw series after edge trimming
        let window_rows: Vec<crate::models::MetricSample> =
            frames.iter().flat_map(|f| f.rows.iter().copied()).collect();

        let trends = aggregate(
            &bands,
            window_rows.len(),
            &window_rows,
            &current_shape,
            &settings.metric_attributes,
            &settings.trend,
        );

        let schedule = if bands.is_empty() {
            vec![]
        } else {
            generate_schedule(&bands.shutdown, &settings.schedule, &series, &history_rows)
        };

        // An instance that is essentially always idle and has no stable
        // run-time rhythm should simply be shut down.
        let idle_dominant = !bands.shutdown.is_empty()
            && (bands.active_rows() as f64)
                < settings.trend.non_straight_min_share * window_rows.len() as f64;
        let shutdown_wins = settings.allow_shutdown
            && idle_dominant
            && schedule.is_empty()
            && !is_shutdown_forbidden(&history_rows);

        let mut resize_action: Option<ResizeAction> = None;
        let mut candidates: Vec<CandidateShape> = Vec::new();
        if !shutdown_wins && settings.allow_resize && !is_resize_forbidden(&history_rows) {
            (resize_action, candidates) = self.run_resize(
                &trends,
                &bands,
                &window_rows,
                &series,
                &current_shape,
                &meta,
                &history_rows,
            );
        }

        let context = purchase_context(&meta);
        if !candidates.is_empty() {
            self.pricing.add_price(&mut candidates, &context);
            if settings.sort_by_price {
                candidates.sort_by(|a, b| match (a.price, b.price) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                });
            }
            if resize_action != Some(ResizeAction::Split) {
                candidates.retain(|c| c.shape != current_shape);
            }
        }

        let mut general_actions: Vec<GeneralAction> = Vec::new();
        if shutdown_wins {
            general_actions.push(GeneralAction::Shutdown);
            candidates.clear();
        } else {
            let schedule_nontrivial =
                !schedule.is_empty() && !(schedule.len() == 1 && schedule[0].is_always_on());
            if settings.allow_schedule && schedule_nontrivial {
                general_actions.push(GeneralAction::Schedule);
            }
            if let Some(action) = resize_action {
                if !candidates.is_empty() {
                    general_actions.push(action.general_action());
                }
            }
            if general_actions.is_empty() {
                general_actions.push(GeneralAction::Empty);
            }
        }

        let savings = if settings.ignore_savings
            || general_actions == [GeneralAction::Empty]
        {
            None
        } else {
            self.savings.calculate(
                &general_actions,
                &current_shape,
                &candidates,
                &schedule,
                &context,
            )
        };

        self.persist_history(
            &resource_id,
            resource_type,
            &general_actions,
            &schedule,
            &candidates,
            series.last_timestamp(),
            savings,
        );

        Ok(PipelineOutcome {
            from_date: series.first_timestamp(),
            to_date: series.last_timestamp(),
            schedule,
            candidates,
            general_actions,
            savings,
        })
    }

    /// Resolve the resize action and candidate shapes from the trends
    #[allow(clippy::too_many_arguments)]
    fn run_resize(
        &self,
        trends: &[Trend],
        bands: &BandedPeriods,
        window_rows: &[crate::models::MetricSample],
        series: &MetricSeries,
        current_shape: &Shape,
        meta: &ResourceMeta,
        history_rows: &[RecommendationHistory],
    ) -> (Option<ResizeAction>, Vec<CandidateShape>) {
        let settings = &self.settings;
        let past_resize: Vec<&RecommendationHistory> = filter_resize(history_rows);
        let matcher = ResizeMatcher::new(self.catalog.as_ref(), &settings.matcher, &settings.trend);

        if trends.len() > 1 {
            let mut split: Vec<CandidateShape> = Vec::new();
            for trend in trends {
                let request = ResizeRequest {
                    trend,
                    current_shape,
                    action: ResizeAction::Split,
                    cloud: series.cloud,
                    resource_type: series.resource_type,
                    preferred_series: &meta.preferred_series,
                    past_resize: past_resize.clone(),
                };
                if let Some(best) = matcher.recommend_size(&request).into_iter().next() {
                    split.push(best);
                }
            }

            let total: f64 = split.iter().map(|c| c.probability).sum();
            if split.len() > 1 && (total - 1.0).abs() <= SPLIT_PROBABILITY_TOLERANCE {
                return (Some(ResizeAction::Split), split);
            }

            // Regimes do not cover the whole window; fall back to one
            // merged trend and a plain resize.
            let merged_config = TrendConfig {
                allow_split: false,
                ..settings.trend.clone()
            };
            let merged = aggregate(
                bands,
                window_rows.len(),
                window_rows,
                current_shape,
                &settings.metric_attributes,
                &merged_config,
            );
            return self.single_resize(&merged[0], series, current_shape, meta, past_resize);
        }

        match trends.first() {
            Some(trend) => self.single_resize(trend, series, current_shape, meta, past_resize),
            None => (None, vec![]),
        }
    }

    fn single_resize(
        &self,
        trend: &Trend,
        series: &MetricSeries,
        current_shape: &Shape,
        meta: &ResourceMeta,
        past_resize: Vec<&RecommendationHistory>,
    ) -> (Option<ResizeAction>, Vec<CandidateShape>) {
        let settings = &self.settings;
        let directions = trend.directions(current_shape, &settings.trend);
        let Some(action) = action_from_directions(&directions) else {
            return (None, vec![]);
        };

        let matcher = ResizeMatcher::new(self.catalog.as_ref(), &settings.matcher, &settings.trend);
        let request = ResizeRequest {
            trend,
            current_shape,
            action,
            cloud: series.cloud,
            resource_type: series.resource_type,
            preferred_series: &meta.preferred_series,
            past_resize,
        };
        (Some(action), matcher.recommend_size(&request))
    }

    #[allow(clippy::too_many_arguments)]
    fn persist_history(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        general_actions: &[GeneralAction],
        schedule: &[ScheduleWindow],
        candidates: &[CandidateShape],
        capture_date: Option<DateTime<Utc>>,
        savings: Option<SavingsRecord>,
    ) {
        let mut rows_written = 0u64;
        for action in general_actions {
            let entry = match action {
                GeneralAction::Shutdown => {
                    Some((RecommendationType::Shutdown, HistoryPayload::None))
                }
                GeneralAction::Schedule => Some((
                    RecommendationType::Schedule,
                    HistoryPayload::Schedule(schedule.to_vec()),
                )),
                GeneralAction::Split => Some((
                    RecommendationType::Split,
                    HistoryPayload::Shapes(candidates.to_vec()),
                )),
                GeneralAction::ScaleUp
                | GeneralAction::ScaleDown
                | GeneralAction::ChangeShape => Some((
                    RecommendationType::Resize,
                    HistoryPayload::Shapes(candidates.to_vec()),
                )),
                // Nothing actionable to track for these
                GeneralAction::Empty | GeneralAction::Error => None,
            };
            if let Some((recommendation_type, payload)) = entry {
                self.history.create_or_update(NewHistory {
                    resource_id: resource_id.to_string(),
                    resource_type,
                    recommendation_type,
                    recommendation: payload,
                    last_metric_capture_date: capture_date,
                    savings: savings.map(|s| s.monthly),
                });
                rows_written += 1;
            }
        }
        self.metrics.inc_history_rows(rows_written);
    }
}

/// Map per-metric verdicts to the one action the search runs under
fn action_from_directions(
    directions: &[(crate::models::MetricAttribute, ResizeDirection)],
) -> Option<ResizeAction> {
    let moving: Vec<ResizeDirection> = directions
        .iter()
        .map(|(_, d)| *d)
        .filter(|d| *d != ResizeDirection::Keep)
        .collect();
    if moving.is_empty() {
        return None;
    }
    if moving.iter().all(|d| *d == ResizeDirection::Up) {
        Some(ResizeAction::ScaleUp)
    } else if moving.iter().all(|d| *d == ResizeDirection::Down) {
        Some(ResizeAction::ScaleDown)
    } else {
        Some(ResizeAction::ChangeShape)
    }
}

/// Purchase context carried by the resource meta
pub fn purchase_context(meta: &ResourceMeta) -> PurchaseContext {
    PurchaseContext {
        customer: meta.customer.clone(),
        region: meta.region.clone(),
        os: meta.os.clone(),
    }
}
