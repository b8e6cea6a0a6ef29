//! Operation statistics
//!
//! Counters are relaxed atomics updated on every store operation and read
//! back through [`StatsSnapshot`].

mod metrics;

pub use metrics::{OperationStats, StatsSnapshot};
