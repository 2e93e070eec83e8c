//! Derived insights computed from check-in history.

use crate::ids::{ClientId, InsightId};
use crate::range::DateRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate signals over a date range. `None` means no record carried the metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSignals {
    pub avg_sleep: Option<f64>,
    pub avg_soreness: Option<f64>,
    pub weight_delta: Option<f64>,
}

/// A persisted insight. One exists per (client, range).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: InsightId,
    pub client_id: ClientId,
    pub range: DateRange,
    pub signals: InsightSignals,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fresh computation to upsert, keyed by (client, range).
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedInsight {
    pub client_id: ClientId,
    pub range: DateRange,
    pub signals: InsightSignals,
    pub summary: String,
}
