//! Recommendation synthesis
//!
//! The resize matcher, the schedule synthesizer, and the assemblers
//! that turn pipeline output into recommendation records, per resource
//! and per autoscaling group.

pub mod assembler;
pub mod group;
pub mod resize;
pub mod schedule;

pub use assembler::{purchase_context, RecommendationEngine, ResourceContext, RECORD_SOURCE};
pub use group::{GroupRecommendation, NonMatchingMember};
pub use resize::{MatcherConfig, ResizeMatcher, ResizeRequest};
pub use schedule::{generate_schedule, ScheduleConfig};
