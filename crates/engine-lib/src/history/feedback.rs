//! Feedback-driven adjustment of recommendation behavior
//!
//! Operator verdicts on past recommendations narrow what the engine may
//! propose next: rejected shapes are not proposed again, sizing feedback
//! moves the candidate pool strictly up or down, and DONT_RECOMMEND
//! suppresses a whole recommendation kind.

use crate::models::{
    FeedbackStatus, RecommendationHistory, RecommendationType, Shape,
};

/// How many of the most recently recommended shapes anchor the
/// sizing-feedback rules
const FEEDBACK_SHAPE_WINDOW: usize = 3;

/// Rows an operator marked as applied
pub fn filter_applied(rows: &[RecommendationHistory]) -> Vec<&RecommendationHistory> {
    rows.iter()
        .filter(|r| r.feedback == Some(FeedbackStatus::Applied))
        .collect()
}

/// Rows carrying shape proposals (plain resize and workload split)
pub fn filter_resize(rows: &[RecommendationHistory]) -> Vec<&RecommendationHistory> {
    rows.iter()
        .filter(|r| {
            matches!(
                r.recommendation_type,
                RecommendationType::Resize | RecommendationType::Split
            )
        })
        .collect()
}

/// Shutdown proposals are suppressed once one was rejected
pub fn is_shutdown_forbidden(rows: &[RecommendationHistory]) -> bool {
    rows.iter().any(|r| {
        r.recommendation_type == RecommendationType::Shutdown
            && matches!(
                r.feedback,
                Some(FeedbackStatus::DontRecommend) | Some(FeedbackStatus::Wrong)
            )
    })
}

pub fn is_schedule_forbidden(rows: &[RecommendationHistory]) -> bool {
    rows.iter().any(|r| {
        r.recommendation_type == RecommendationType::Schedule
            && r.feedback == Some(FeedbackStatus::DontRecommend)
    })
}

pub fn is_resize_forbidden(rows: &[RecommendationHistory]) -> bool {
    filter_resize(rows)
        .iter()
        .any(|r| r.feedback == Some(FeedbackStatus::DontRecommend))
}

/// Narrow a candidate shape pool using past sizing feedback.
///
/// TOO_SMALL keeps only shapes at least as large as the largest
/// previously proposed shape on both cpu and memory, and strictly larger
/// on at least one, so the same under-sized proposal cannot repeat.
/// TOO_LARGE is the mirror. WRONG removes previously proposed shapes by
/// name.
pub fn adjust_for_feedback(
    mut candidates: Vec<Shape>,
    past_resize: &[&RecommendationHistory],
) -> Vec<Shape> {
    if let Some(anchor) = latest_with(past_resize, FeedbackStatus::TooSmall) {
        if let Some((max_cpu, max_mem)) = bounds(anchor, f64::max) {
            candidates.retain(|s| {
                let cpu = f64::from(s.cpu);
                cpu >= max_cpu
                    && s.memory_gib >= max_mem
                    && (cpu > max_cpu || s.memory_gib > max_mem)
            });
        }
    }

    if let Some(anchor) = latest_with(past_resize, FeedbackStatus::TooLarge) {
        if let Some((min_cpu, min_mem)) = bounds(anchor, f64::min) {
            candidates.retain(|s| {
                let cpu = f64::from(s.cpu);
                cpu <= min_cpu
                    && s.memory_gib <= min_mem
                    && (cpu < min_cpu || s.memory_gib < min_mem)
            });
        }
    }

    let rejected: Vec<&str> = past_resize
        .iter()
        .filter(|r| r.feedback == Some(FeedbackStatus::Wrong))
        .flat_map(|r| recent_shapes(r).map(|s| s.name.as_str()))
        .collect();
    if !rejected.is_empty() {
        candidates.retain(|s| !rejected.contains(&s.name.as_str()));
    }

    candidates
}

fn latest_with<'a>(
    rows: &[&'a RecommendationHistory],
    feedback: FeedbackStatus,
) -> Option<&'a RecommendationHistory> {
    rows.iter()
        .filter(|r| r.feedback == Some(feedback))
        .max_by_key(|r| (r.added_at, r.id))
        .copied()
}

/// The most recently recommended shapes of one row
fn recent_shapes(row: &RecommendationHistory) -> impl Iterator<Item = &Shape> {
    row.recommendation
        .shapes()
        .iter()
        .take(FEEDBACK_SHAPE_WINDOW)
        .map(|c| &c.shape)
}

/// Extreme (cpu, memory) over the anchor row's recent shapes
fn bounds(row: &RecommendationHistory, pick: fn(f64, f64) -> f64) -> Option<(f64, f64)> {
    let mut result: Option<(f64, f64)> = None;
    for shape in recent_shapes(row) {
        let cpu = f64::from(shape.cpu);
        result = Some(match result {
            None => (cpu, shape.memory_gib),
            Some((c, m)) => (pick(c, cpu), pick(m, shape.memory_gib)),
        });
    }
    result
}
