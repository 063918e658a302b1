//! Shape-matching resize search
//!
//! Derives acceptable capacity ranges from a trend, filters the shape
//! catalog through compatibility, preference and feedback rules, and
//! returns a ranked, deduplicated, probability-annotated candidate list.
//! When the strict pass comes up short the trend is relaxed (soft
//! network/IOPS requirements dropped) and the search runs once more.

use crate::catalog::ShapeCatalog;
use crate::history::adjust_for_feedback;
use crate::models::{
    CandidateShape, Cloud, MetricAttribute, RecommendationHistory, ResizeAction, ResourceType,
    Shape, ShapeCompatibility,
};
use crate::pipeline::trend::{round2, Trend, TrendConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Resize search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub compatibility: ShapeCompatibility,
    pub max_results: usize,
    /// Disallow candidates outside the current series
    pub forbid_change_series: bool,
    /// Disallow candidates outside the current family
    pub forbid_change_family: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            compatibility: ShapeCompatibility::Compatible,
            max_results: 3,
            forbid_change_series: false,
            forbid_change_family: false,
        }
    }
}

/// One resize request against the catalog
pub struct ResizeRequest<'a> {
    pub trend: &'a Trend,
    pub current_shape: &'a Shape,
    pub action: ResizeAction,
    pub cloud: Cloud,
    pub resource_type: ResourceType,
    /// Customer shape-preference rule: allowed series, empty means all
    pub preferred_series: &'a [String],
    /// Past resize history for feedback narrowing
    pub past_resize: Vec<&'a RecommendationHistory>,
}

/// Acceptable capacity window for one metric
#[derive(Debug, Clone, PartialEq)]
struct MetricRange {
    attribute: MetricAttribute,
    /// Peak demand must stay under the utilization ceiling
    min_capacity: f64,
    /// Bounded only for metrics that drive the resize, so a fit on the
    /// driving metric is not vetoed by an already-satisfied one
    max_capacity: Option<f64>,
}

/// Shape search over the catalog
pub struct ResizeMatcher<'a> {
    catalog: &'a dyn ShapeCatalog,
    config: &'a MatcherConfig,
    trend_config: &'a TrendConfig,
}

impl<'a> ResizeMatcher<'a> {
    pub fn new(
        catalog: &'a dyn ShapeCatalog,
        config: &'a MatcherConfig,
        trend_config: &'a TrendConfig,
    ) -> Self {
        Self {
            catalog,
            config,
            trend_config,
        }
    }

    /// Run the search, relaxing and retrying once if too few shapes fit
    pub fn recommend_size(&self, request: &ResizeRequest) -> Vec<CandidateShape> {
        let mut results = self.search(request, request.trend, true);

        if request.action == ResizeAction::Split {
            let share = request.trend.probability.unwrap_or(1.0);
            let mut stamped: Vec<CandidateShape> = Vec::with_capacity(results.len());
            for mut candidate in results {
                // For a split, probability is the regime's time share,
                // not fit confidence
                candidate.probability = share;
                if !stamped.contains(&candidate) {
                    stamped.push(candidate);
                }
            }
            return stamped;
        }
        results
    }

    fn search(
        &self,
        request: &ResizeRequest,
        trend: &Trend,
        allow_recursion: bool,
    ) -> Vec<CandidateShape> {
        if !trend.requires_resize(request.current_shape, self.trend_config) {
            if request.action == ResizeAction::Split {
                return vec![CandidateShape::new(
                    request.current_shape.clone(),
                    trend.probability.unwrap_or(1.0),
                )];
            }
            return vec![];
        }

        let ranges = self.derive_ranges(trend, request.current_shape);
        let pool = self.filtered_pool(request);
        let tiers = self.tiers(pool, request);

        let mut suitable: Vec<CandidateShape> = Vec::new();
        'tiers: for tier in &tiers {
            for shape in tier {
                if !satisfies(shape, &ranges) {
                    continue;
                }
                let candidate = CandidateShape::new(
                    shape.clone(),
                    self.fit_probability(trend, request.current_shape, shape),
                );
                if !suitable.contains(&candidate) {
                    suitable.push(candidate);
                }
                if suitable.len() >= self.config.max_results {
                    break 'tiers;
                }
            }
        }

        if suitable.len() < self.config.max_results && allow_recursion {
            debug!(
                found = suitable.len(),
                wanted = self.config.max_results,
                "relaxing soft requirements and retrying shape search"
            );
            let relaxed = trend.without_optional_requirements();
            for candidate in self.search(request, &relaxed, false) {
                if !suitable.contains(&candidate) {
                    suitable.push(candidate);
                }
            }
            suitable.truncate(self.config.max_results);
        }

        suitable
    }

    /// Acceptable capacity windows from the trend percentiles vs. the
    /// current shape. CPU and memory always constrain when collected;
    /// network and IOPS only when they carry signal.
    fn derive_ranges(&self, trend: &Trend, current: &Shape) -> Vec<MetricRange> {
        let floor = self.trend_config.utilization_floor;
        let ceiling = self.trend_config.utilization_ceiling;

        trend
            .live_metrics()
            .filter_map(|metric| {
                let p90_abs = metric.absolute_percentiles(current)?[8];
                if p90_abs <= 0.0 {
                    return None;
                }
                let utilization = metric.current_utilization(current)?;
                let drives_resize = utilization > ceiling || utilization < floor;
                Some(MetricRange {
                    attribute: metric.attribute,
                    min_capacity: p90_abs / ceiling,
                    max_capacity: drives_resize.then_some(p90_abs / floor),
                })
            })
            .collect()
    }

    /// Catalog shapes surviving preference, compatibility and feedback
    /// filters
    fn filtered_pool(&self, request: &ResizeRequest) -> Vec<Shape> {
        let mut pool = self.catalog.list(request.cloud, request.resource_type);

        if !request.preferred_series.is_empty() {
            pool.retain(|s| request.preferred_series.contains(&s.series));
        }

        let current = request.current_shape;
        pool.retain(|s| match self.config.compatibility {
            ShapeCompatibility::None => true,
            ShapeCompatibility::Same => s.family_type == current.family_type,
            ShapeCompatibility::Compatible => {
                s.family_type == current.family_type
                    || s.family_type == "general"
                    || current.family_type == "general"
            }
        });

        adjust_for_feedback(pool, &request.past_resize)
    }

    /// Priority tiers, each sorted by (cpu, memory) ascending
    fn tiers(&self, pool: Vec<Shape>, request: &ResizeRequest) -> Vec<Vec<Shape>> {
        let current = request.current_shape;
        let keep_current = request.action == ResizeAction::Split;

        let mut preferred: Vec<Shape> = Vec::new();
        let mut same_series: Vec<Shape> = Vec::new();
        let mut same_family: Vec<Shape> = Vec::new();
        let mut rest: Vec<Shape> = Vec::new();

        for shape in pool {
            if shape == *current && !keep_current {
                continue;
            }
            if shape.series == current.series {
                same_series.push(shape);
            } else if request.preferred_series.contains(&shape.series) {
                preferred.push(shape);
            } else if shape.family_type == current.family_type {
                if !self.config.forbid_change_series {
                    same_family.push(shape);
                }
            } else if !self.config.forbid_change_series && !self.config.forbid_change_family {
                rest.push(shape);
            }
        }

        let mut tiers = vec![preferred, same_series, same_family, rest];
        for tier in &mut tiers {
            tier.sort_by(|a, b| a.cpu.cmp(&b.cpu).then(a.memory_gib.total_cmp(&b.memory_gib)));
        }
        tiers
    }

    /// Share of trend percentile points that land inside the target
    /// utilization band when scaled onto the candidate's capacity,
    /// averaged over the metrics that carry signal. No usable signal
    /// yields 0.0.
    fn fit_probability(&self, trend: &Trend, current: &Shape, candidate: &Shape) -> f64 {
        let floor = self.trend_config.utilization_floor;
        let ceiling = self.trend_config.utilization_ceiling;

        let mut fractions: Vec<f64> = Vec::new();
        for metric in trend.live_metrics() {
            let Some(points) = metric.absolute_percentiles(current) else {
                continue;
            };
            let Some(capacity) = candidate.capacity(metric.attribute) else {
                continue;
            };
            if capacity <= 0.0 {
                continue;
            }
            let in_band = points
                .iter()
                .filter(|p| {
                    let utilization = *p / capacity;
                    utilization >= floor && utilization <= ceiling
                })
                .count();
            fractions.push(in_band as f64 / points.len() as f64);
        }

        if fractions.is_empty() {
            return 0.0;
        }
        round2(fractions.iter().sum::<f64>() / fractions.len() as f64)
    }
}

/// A shape is suitable iff it satisfies every derived range
fn satisfies(shape: &Shape, ranges: &[MetricRange]) -> bool {
    ranges.iter().all(|range| {
        let Some(capacity) = shape.capacity(range.attribute) else {
            // A constrained metric the candidate does not publish
            // cannot be verified
            return false;
        };
        capacity >= range.min_capacity
            && range.max_capacity.map_or(true, |max| capacity <= max)
    })
}
