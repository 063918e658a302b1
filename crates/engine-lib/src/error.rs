//! Error taxonomy for the recommendation engine
//!
//! A resource-level failure is always contained at the per-resource
//! boundary: the assembler converts these into report statuses and the
//! scan loop moves on to the next resource.

use thiserror::Error;

/// Errors raised while producing a recommendation for one resource
#[derive(Debug, Error)]
pub enum EngineError {
    /// Metric coverage is below the configured minimum. Not a failure:
    /// the assembler downgrades this to an "insufficient" report.
    #[error("insufficient metric coverage: {days} days available, {required} required")]
    InsufficientData { days: u32, required: u32 },

    /// Upstream signalled this resource should be retried on a later scan.
    #[error("processing postponed: {0}")]
    Postponed(String),

    /// The metric series violates a structural invariant.
    #[error("malformed metric series: {0}")]
    MalformedSeries(String),

    /// The resource references a shape the catalog does not know.
    #[error("unknown shape: {0}")]
    UnknownShape(String),

    /// The engine settings are inconsistent.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Anything unexpected from a collaborator, wrapped at the boundary.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// True for conditions that are expected outcomes rather than faults.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. } | EngineError::Postponed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_classification() {
        assert!(EngineError::InsufficientData { days: 3, required: 14 }.is_benign());
        assert!(EngineError::Postponed("metrics still syncing".into()).is_benign());
        assert!(!EngineError::UnknownShape("m9.mega".into()).is_benign());
        assert!(!EngineError::MalformedSeries("unsorted index".into()).is_benign());
    }

    #[test]
    fn test_display_preserves_message() {
        let err = EngineError::MalformedSeries("duplicate timestamp".into());
        assert_eq!(
            err.to_string(),
            "malformed metric series: duplicate timestamp"
        );
    }
}
