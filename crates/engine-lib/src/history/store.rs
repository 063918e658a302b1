//! Recommendation history persistence
//!
//! At most one unresolved row may exist per (resource, type,
//! recommendation kind) within the current ISO week; repeated scans
//! update that row in place instead of inserting. The backing document
//! store is external; this module ships the trait plus an in-memory
//! implementation used by the scanner and the tests.

use crate::models::{
    FeedbackStatus, HistoryPayload, RecommendationHistory, RecommendationType, ResourceType,
};
use chrono::{DateTime, Datelike, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Fields of a history row the engine supplies; identity and timestamps
/// belong to the store.
#[derive(Debug, Clone)]
pub struct NewHistory {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub recommendation_type: RecommendationType,
    pub recommendation: HistoryPayload,
    pub last_metric_capture_date: Option<DateTime<Utc>>,
    pub savings: Option<f64>,
}

/// History access used by the matcher, synthesizer and assembler
pub trait HistoryStore: Send + Sync {
    /// Every row for a resource, oldest first
    fn list(&self, resource_id: &str, resource_type: ResourceType) -> Vec<RecommendationHistory>;

    /// Rows added within the current ISO week, optionally narrowed to a
    /// recommendation kind and to unresolved rows
    fn recent(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        recommendation_type: Option<RecommendationType>,
        unresolved_only: bool,
    ) -> Vec<RecommendationHistory>;

    /// Insert, or mutate the week's unresolved row for the same key
    fn create_or_update(&self, row: NewHistory) -> RecommendationHistory;

    /// Attach operator feedback to a row; false if the id is unknown
    fn record_feedback(&self, id: u64, feedback: FeedbackStatus) -> bool;
}

/// Monday 00:00 UTC of the ISO week containing `now`
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_back = i64::from(now.weekday().num_days_from_monday());
    (now - Duration::days(days_back))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HistoryKey {
    resource_id: String,
    resource_type: ResourceType,
}

/// DashMap-backed store for single-process deployments and tests
#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: DashMap<HistoryKey, Vec<RecommendationHistory>>,
    next_id: AtomicU64,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(resource_id: &str, resource_type: ResourceType) -> HistoryKey {
        HistoryKey {
            resource_id: resource_id.to_string(),
            resource_type,
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn list(&self, resource_id: &str, resource_type: ResourceType) -> Vec<RecommendationHistory> {
        self.rows
            .get(&Self::key(resource_id, resource_type))
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    fn recent(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        recommendation_type: Option<RecommendationType>,
        unresolved_only: bool,
    ) -> Vec<RecommendationHistory> {
        let since = week_start(Utc::now());
        self.list(resource_id, resource_type)
            .into_iter()
            .filter(|row| row.added_at >= since)
            .filter(|row| recommendation_type.map_or(true, |t| row.recommendation_type == t))
            .filter(|row| !unresolved_only || row.is_unresolved())
            .collect()
    }

    fn create_or_update(&self, row: NewHistory) -> RecommendationHistory {
        let now = Utc::now();
        let since = week_start(now);
        let key = Self::key(&row.resource_id, row.resource_type);
        let mut rows = self.rows.entry(key).or_default();

        let open_ids: Vec<u64> = rows
            .iter()
            .filter(|r| {
                r.recommendation_type == row.recommendation_type
                    && r.is_unresolved()
                    && r.added_at >= since
            })
            .map(|r| r.id)
            .collect();

        if open_ids.is_empty() {
            let created = RecommendationHistory {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                resource_id: row.resource_id,
                resource_type: row.resource_type,
                recommendation_type: row.recommendation_type,
                recommendation: row.recommendation,
                feedback: None,
                added_at: now,
                last_metric_capture_date: row.last_metric_capture_date,
                savings: row.savings,
            };
            rows.push(created.clone());
            return created;
        }

        let keep_id = rows
            .iter()
            .filter(|r| open_ids.contains(&r.id))
            .max_by_key(|r| (r.added_at, r.id))
            .map(|r| r.id)
            .expect("open rows exist");

        // Duplicate unresolved rows should not happen; self-heal by
        // keeping only the most recent one.
        if open_ids.len() > 1 {
            warn!(
                resource_id = %row.resource_id,
                count = open_ids.len(),
                "duplicate unresolved history rows, keeping newest"
            );
            rows.retain(|r| !open_ids.contains(&r.id) || r.id == keep_id);
        }

        let target = rows
            .iter_mut()
            .find(|r| r.id == keep_id)
            .expect("kept row present");
        target.recommendation = row.recommendation;
        target.last_metric_capture_date = row.last_metric_capture_date;
        target.savings = row.savings;
        target.added_at = now;
        target.clone()
    }

    fn record_feedback(&self, id: u64, feedback: FeedbackStatus) -> bool {
        for mut entry in self.rows.iter_mut() {
            if let Some(row) = entry.value_mut().iter_mut().find(|r| r.id == id) {
                row.feedback = Some(feedback);
                return true;
            }
        }
        false
    }
}
