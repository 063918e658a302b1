//! Recommendation records and the per-tenant report sink
//!
//! One JSON-serializable record per resource, appended as one line of a
//! `.jsonl` file per (customer, cloud, tenant, region).

use crate::models::{CandidateShape, Cloud, GeneralAction, ResourceType, ScheduleWindow};
use crate::pricing::SavingsRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Terminal status of one resource's scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationStatus {
    Ok,
    Error,
    Postponed,
    Insufficient,
}

/// How urgently an operator should look at a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Placement and purchase context of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub customer: String,
    pub tenant: String,
    pub region: String,
    pub os: String,
    /// Customer shape-preference rule: allowed series, empty means all
    #[serde(default)]
    pub preferred_series: Vec<String>,
}

/// Window and outcome bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStats {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub status: RecommendationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The recommendation payload proper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBody {
    pub schedule: Vec<ScheduleWindow>,
    pub recommended_shapes: Vec<CandidateShape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<SavingsRecord>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub advanced: serde_json::Value,
}

/// One recommendation record per resource per scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub cloud: Cloud,
    pub source: String,
    pub severity: Severity,
    pub recommendation: RecommendationBody,
    pub stats: RecommendationStats,
    pub meta: ResourceMeta,
    pub general_actions: Vec<GeneralAction>,
}

/// Severity follows the most pressing general action
pub fn severity_for(actions: &[GeneralAction]) -> Severity {
    let mut severity = Severity::Info;
    for action in actions {
        let level = match action {
            GeneralAction::ScaleUp => Severity::Critical,
            GeneralAction::Shutdown
            | GeneralAction::Schedule
            | GeneralAction::ScaleDown
            | GeneralAction::ChangeShape
            | GeneralAction::Split => Severity::Warning,
            GeneralAction::Empty | GeneralAction::Error => Severity::Info,
        };
        if rank(level) > rank(severity) {
            severity = level;
        }
    }
    severity
}

fn rank(severity: Severity) -> u8 {
    match severity {
        Severity::Info => 0,
        Severity::Warning => 1,
        Severity::Critical => 2,
    }
}

/// Appends records to per-tenant `.jsonl` report files
#[derive(Debug, Clone)]
pub struct ReportWriter {
    base_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn report_path(&self, record: &RecommendationRecord) -> PathBuf {
        let cloud = match record.cloud {
            Cloud::Aws => "aws",
            Cloud::Azure => "azure",
            Cloud::Gcp => "gcp",
        };
        self.base_dir.join(format!(
            "{}_{}_{}_{}.jsonl",
            record.meta.customer, cloud, record.meta.tenant, record.meta.region
        ))
    }

    /// Append one record as a single JSON line
    pub fn append(&self, record: &RecommendationRecord) -> Result<PathBuf> {
        let path = self.report_path(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report dir {}", parent.display()))?;
        }
        let line = serde_json::to_string(record).context("serializing recommendation record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening report file {}", path.display()))?;
        writeln!(file, "{line}").context("appending recommendation record")?;
        Ok(path)
    }
}

/// Count the lines already written to a report file
pub fn count_records(path: &Path) -> Result<usize> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().filter(|l| !l.trim().is_empty()).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(actions: Vec<GeneralAction>) -> RecommendationRecord {
        RecommendationRecord {
            resource_id: "i-report".into(),
            resource_type: ResourceType::Instance,
            cloud: Cloud::Aws,
            source: "rightsizer".into(),
            severity: severity_for(&actions),
            recommendation: RecommendationBody::default(),
            stats: RecommendationStats {
                from_date: None,
                to_date: None,
                status: RecommendationStatus::Ok,
                message: None,
            },
            meta: ResourceMeta {
                customer: "acme".into(),
                tenant: "prod".into(),
                region: "us-east-1".into(),
                os: "linux".into(),
                preferred_series: vec![],
            },
            general_actions: actions,
        }
    }

    #[test]
    fn test_severity_priority() {
        assert_eq!(severity_for(&[]), Severity::Info);
        assert_eq!(severity_for(&[GeneralAction::Empty]), Severity::Info);
        assert_eq!(severity_for(&[GeneralAction::Shutdown]), Severity::Warning);
        assert_eq!(
            severity_for(&[GeneralAction::Schedule, GeneralAction::ScaleUp]),
            Severity::Critical
        );
    }

    #[test]
    fn test_report_path_layout() {
        let writer = ReportWriter::new("/tmp/reports");
        let path = writer.report_path(&record(vec![]));
        assert_eq!(
            path,
            PathBuf::from("/tmp/reports/acme_aws_prod_us-east-1.jsonl")
        );
    }

    #[test]
    fn test_append_is_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());

        let rec = record(vec![GeneralAction::Shutdown]);
        let path = writer.append(&rec).unwrap();
        writer.append(&rec).unwrap();

        assert_eq!(count_records(&path).unwrap(), 2);
        let content = fs::read_to_string(&path).unwrap();
        let parsed: RecommendationRecord =
            serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.resource_id, "i-report");
        assert_eq!(parsed.general_actions, vec![GeneralAction::Shutdown]);
    }
}
