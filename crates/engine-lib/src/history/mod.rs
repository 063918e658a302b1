//! Recommendation history and operator feedback
//!
//! The store keeps the most recently emitted recommendation per
//! (resource, kind) per ISO week; feedback rows steer future scans away
//! from proposals an operator already rejected.

pub mod feedback;
pub mod store;

pub use feedback::{
    adjust_for_feedback, filter_applied, filter_resize, is_resize_forbidden,
    is_schedule_forbidden, is_shutdown_forbidden,
};
pub use store::{week_start, HistoryStore, InMemoryHistoryStore, NewHistory};
