//! Insight worker for Tempo.
//!
//! Consumes insight jobs, scans a client's check-ins for the requested range,
//! computes aggregate signals with a rule-based summary, upserts the result
//! and evicts the cached copy.

pub mod aggregation;
pub mod handler;

pub use aggregation::{MetricSpec, aggregate, summarize};
pub use handler::{InsightJobHandler, ScanLimits};
