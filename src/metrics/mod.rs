//! Metrics
//!
//! Process-wide atomic counters for tunnel activity, summarized in the log
//! when a listener stops.

mod counters;

pub use counters::*;
