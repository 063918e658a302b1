//! Autoscaling-group recommendations
//!
//! The group variant of the engine: instead of a shape search it decides
//! whether the whole group should scale up, down, or stay, and by how
//! many instances. A cooldown window keeps repeated scans from flapping
//! the decision.

use crate::models::{
    GeneralAction, GroupPolicy, GroupScaleDecision, HistoryPayload, RecommendationType,
    ResourceType, ScaleStep,
};
use crate::history::NewHistory;
use crate::pipeline::trend::percentile_sorted;
use crate::recommend::assembler::{RecommendationEngine, ResourceContext};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Aggregate load percentile the group decision is based on
const GROUP_LOAD_PERCENTILE: f64 = 90.0;

/// A member that does not run the group's majority instance type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonMatchingMember {
    pub resource_id: String,
    pub suggested_action: GeneralAction,
}

/// Group-level recommendation output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecommendation {
    pub group_id: String,
    pub action: GeneralAction,
    pub scale_step: u32,
    pub majority_instance_type: Option<String>,
    pub non_matching: Vec<NonMatchingMember>,
    /// Aggregate p90 CPU load across matching members, in percent
    pub aggregate_cpu_load: f64,
    /// True when the previous decision was reused under cooldown
    pub reused: bool,
}

impl RecommendationEngine {
    /// Produce the scale recommendation for an autoscaling group.
    ///
    /// Members share the group policy; the decision is made on the
    /// members running the majority instance type.
    pub fn recommend_group(
        &self,
        policy: &GroupPolicy,
        members: &[ResourceContext],
    ) -> GroupRecommendation {
        // Inside the cooldown window the previous decision stands
        if let Some(previous) = self.cooldown_decision(policy) {
            info!(group = %policy.id, "cooldown active, reusing last decision");
            return GroupRecommendation {
                group_id: policy.id.clone(),
                action: previous.action,
                scale_step: previous.scale_step,
                majority_instance_type: previous.majority_instance_type,
                non_matching: vec![],
                aggregate_cpu_load: 0.0,
                reused: true,
            };
        }

        let recommendation = self.evaluate_group(policy, members);

        self.history_store().create_or_update(NewHistory {
            resource_id: policy.id.clone(),
            resource_type: ResourceType::AutoscalingGroup,
            recommendation_type: RecommendationType::GroupScale,
            recommendation: HistoryPayload::Group(GroupScaleDecision {
                action: recommendation.action,
                scale_step: recommendation.scale_step,
                majority_instance_type: recommendation.majority_instance_type.clone(),
            }),
            last_metric_capture_date: members
                .iter()
                .filter_map(|m| m.series.last_timestamp())
                .max(),
            savings: None,
        });

        recommendation
    }

    fn cooldown_decision(&self, policy: &GroupPolicy) -> Option<GroupScaleDecision> {
        if policy.cooldown_days == 0 {
            return None;
        }
        let rows = self
            .history_store()
            .list(&policy.id, ResourceType::AutoscalingGroup);
        let last = rows
            .iter()
            .filter(|r| r.recommendation_type == RecommendationType::GroupScale)
            .max_by_key(|r| (r.added_at, r.id))?;
        let elapsed = Utc::now() - last.added_at;
        if elapsed >= Duration::days(i64::from(policy.cooldown_days)) {
            return None;
        }
        match &last.recommendation {
            HistoryPayload::Group(decision) => Some(decision.clone()),
            _ => None,
        }
    }

    fn evaluate_group(
        &self,
        policy: &GroupPolicy,
        members: &[ResourceContext],
    ) -> GroupRecommendation {
        let Some(majority) = majority_instance_type(members) else {
            // Without a unique majority type there is nothing coherent
            // to scale; flag every member instead.
            debug!(group = %policy.id, "no unique majority instance type");
            return GroupRecommendation {
                group_id: policy.id.clone(),
                action: GeneralAction::Empty,
                scale_step: 0,
                majority_instance_type: None,
                non_matching: members
                    .iter()
                    .map(|m| NonMatchingMember {
                        resource_id: m.series.resource_id.clone(),
                        suggested_action: GeneralAction::Shutdown,
                    })
                    .collect(),
                aggregate_cpu_load: 0.0,
                reused: false,
            };
        };

        let matching: Vec<&ResourceContext> = members
            .iter()
            .filter(|m| m.series.instance_type == majority)
            .collect();
        let non_matching: Vec<NonMatchingMember> = members
            .iter()
            .filter(|m| m.series.instance_type != majority)
            .map(|m| NonMatchingMember {
                resource_id: m.series.resource_id.clone(),
                suggested_action: GeneralAction::Shutdown,
            })
            .collect();

        let cpu_p90 = aggregate_percentile(&matching, |s| s.cpu_load);
        let mem_p90 = aggregate_percentile(&matching, |s| s.memory_load);
        let count = matching.len() as u32;

        let thresholds = policy.thresholds;
        let (action, scale_step) = if cpu_p90 > thresholds.max {
            let step = scale_step_for(policy, count, cpu_p90.max(mem_p90), true);
            (GeneralAction::ScaleUp, step)
        } else if cpu_p90 < thresholds.min {
            let step = scale_step_for(policy, count, cpu_p90.max(mem_p90), false);
            if step == 0 {
                (GeneralAction::Empty, 0)
            } else {
                (GeneralAction::ScaleDown, step)
            }
        } else {
            (GeneralAction::Empty, 0)
        };

        GroupRecommendation {
            group_id: policy.id.clone(),
            action,
            scale_step,
            majority_instance_type: Some(majority),
            non_matching,
            aggregate_cpu_load: cpu_p90,
            reused: false,
        }
    }
}

/// The instance type run by the strict majority of member count; `None`
/// on a tie.
fn majority_instance_type(members: &[ResourceContext]) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for member in members {
        match counts
            .iter_mut()
            .find(|(t, _)| *t == member.series.instance_type)
        {
            Some((_, n)) => *n += 1,
            None => counts.push((member.series.instance_type.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    match counts.as_slice() {
        [] => None,
        [only] => Some(only.0.clone()),
        [first, second, ..] if first.1 > second.1 => Some(first.0.clone()),
        _ => None,
    }
}

/// p90 of one metric pooled over all matching members' samples
fn aggregate_percentile(members: &[&ResourceContext], value: fn(&crate::models::MetricSample) -> f64) -> f64 {
    let mut values: Vec<f64> = members
        .iter()
        .flat_map(|m| m.series.samples().iter().map(value))
        .filter(|v| *v >= 0.0)
        .collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&values, GROUP_LOAD_PERCENTILE)
}

/// Instances to add or remove. Fixed steps come from policy; AUTO
/// estimates the target count from capacity demand. A fixed-step
/// scale-down always leaves at least one instance; AUTO may take an
/// idle group to zero.
fn scale_step_for(policy: &GroupPolicy, count: u32, load: f64, up: bool) -> u32 {
    match policy.scale_step {
        ScaleStep::Fixed(step) => {
            if up {
                step
            } else {
                step.min(count.saturating_sub(1))
            }
        }
        ScaleStep::Auto => {
            let desired = policy.thresholds.desired.max(f64::EPSILON);
            let target = (f64::from(count) * load / desired).ceil() as u32;
            if up {
                target.saturating_sub(count).max(1)
            } else {
                count.saturating_sub(target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::small_catalog;
    use crate::history::InMemoryHistoryStore;
    use crate::models::GroupThresholds;
    use crate::pricing::{FlatSavings, StaticPricing};
    use crate::report::ResourceMeta;
    use crate::series::testing::flat_series;
    use crate::settings::EngineSettings;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(
            Arc::new(small_catalog()),
            Arc::new(StaticPricing::new(HashMap::new())),
            Arc::new(FlatSavings::new(StaticPricing::new(HashMap::new()))),
            Arc::new(InMemoryHistoryStore::new()),
            EngineSettings::default(),
        )
        .unwrap()
    }

    fn member(id: &str, instance_type: &str, cpu: f64) -> ResourceContext {
        let mut series = flat_series(21, cpu, 30);
        series.resource_id = id.into();
        series.instance_type = instance_type.into();
        ResourceContext {
            series,
            meta: ResourceMeta::default(),
        }
    }

    fn policy(step: ScaleStep, cooldown_days: u32) -> GroupPolicy {
        GroupPolicy {
            id: "asg-1".into(),
            tag: "web".into(),
            scale_step: step,
            cooldown_days,
            thresholds: GroupThresholds {
                min: 20.0,
                desired: 50.0,
                max: 75.0,
            },
        }
    }

    #[test]
    fn test_hot_group_scales_up() {
        let engine = engine();
        let members = vec![
            member("i-1", "m5.large", 90.0),
            member("i-2", "m5.large", 85.0),
        ];
        let rec = engine.recommend_group(&policy(ScaleStep::Fixed(1), 0), &members);
        assert_eq!(rec.action, GeneralAction::ScaleUp);
        assert_eq!(rec.scale_step, 1);
        assert_eq!(rec.majority_instance_type.as_deref(), Some("m5.large"));
        assert!(rec.aggregate_cpu_load > 75.0);
    }

    #[test]
    fn test_idle_group_scales_down_keeping_one() {
        let engine = engine();
        let members = vec![
            member("i-1", "m5.large", 5.0),
            member("i-2", "m5.large", 6.0),
        ];
        let rec = engine.recommend_group(&policy(ScaleStep::Fixed(5), 0), &members);
        assert_eq!(rec.action, GeneralAction::ScaleDown);
        // Fixed step clamped to leave one instance running
        assert_eq!(rec.scale_step, 1);
    }

    #[test]
    fn test_auto_step_estimates_from_demand() {
        let engine = engine();
        let members: Vec<ResourceContext> = (0..4)
            .map(|i| member(&format!("i-{i}"), "m5.large", 95.0))
            .collect();
        let rec = engine.recommend_group(&policy(ScaleStep::Auto, 0), &members);
        assert_eq!(rec.action, GeneralAction::ScaleUp);
        // 4 instances at ~95% against a 50% target want ~8; step ~4
        assert!(rec.scale_step >= 3);
    }

    #[test]
    fn test_auto_can_scale_idle_group_to_zero() {
        let engine = engine();
        let members = vec![
            member("i-1", "m5.large", 0.0),
            member("i-2", "m5.large", 0.0),
        ];
        let rec = engine.recommend_group(&policy(ScaleStep::Auto, 0), &members);
        assert_eq!(rec.action, GeneralAction::ScaleDown);
        assert_eq!(rec.scale_step, 2);
    }

    #[test]
    fn test_steady_group_no_action() {
        let engine = engine();
        let members = vec![
            member("i-1", "m5.large", 50.0),
            member("i-2", "m5.large", 55.0),
        ];
        let rec = engine.recommend_group(&policy(ScaleStep::Fixed(1), 0), &members);
        assert_eq!(rec.action, GeneralAction::Empty);
        assert_eq!(rec.scale_step, 0);
    }

    #[test]
    fn test_majority_tie_flags_all_members() {
        let engine = engine();
        let members = vec![
            member("i-1", "m5.large", 80.0),
            member("i-2", "c5.xlarge", 80.0),
        ];
        let rec = engine.recommend_group(&policy(ScaleStep::Fixed(1), 0), &members);
        assert_eq!(rec.action, GeneralAction::Empty);
        assert!(rec.majority_instance_type.is_none());
        assert_eq!(rec.non_matching.len(), 2);
        assert!(rec
            .non_matching
            .iter()
            .all(|m| m.suggested_action == GeneralAction::Shutdown));
    }

    #[test]
    fn test_minority_members_flagged() {
        let engine = engine();
        let members = vec![
            member("i-1", "m5.large", 90.0),
            member("i-2", "m5.large", 90.0),
            member("i-3", "c5.xlarge", 10.0),
        ];
        let rec = engine.recommend_group(&policy(ScaleStep::Fixed(1), 0), &members);
        assert_eq!(rec.majority_instance_type.as_deref(), Some("m5.large"));
        assert_eq!(rec.non_matching.len(), 1);
        assert_eq!(rec.non_matching[0].resource_id, "i-3");
    }

    #[test]
    fn test_cooldown_reuses_last_decision() {
        let engine = engine();
        let hot = vec![
            member("i-1", "m5.large", 90.0),
            member("i-2", "m5.large", 85.0),
        ];
        let first = engine.recommend_group(&policy(ScaleStep::Fixed(2), 7), &hot);
        assert_eq!(first.action, GeneralAction::ScaleUp);
        assert!(!first.reused);

        // Load changed, but the cooldown window has not elapsed
        let idle = vec![
            member("i-1", "m5.large", 5.0),
            member("i-2", "m5.large", 5.0),
        ];
        let second = engine.recommend_group(&policy(ScaleStep::Fixed(2), 7), &idle);
        assert!(second.reused);
        assert_eq!(second.action, GeneralAction::ScaleUp);
        assert_eq!(second.scale_step, first.scale_step);
    }
}
