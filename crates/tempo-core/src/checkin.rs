//! Daily check-in records and their paginated queries.

use crate::ids::{CheckinId, ClientId};
use crate::range::DateRange;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metric bag recorded with a check-in.
///
/// Coaches record heterogeneous shapes (`sleep`, `sleepHours`, `"7.5"`...),
/// so values stay as raw JSON until aggregation interprets them.
pub type Metrics = serde_json::Map<String, serde_json::Value>;

/// A stored daily check-in. At most one exists per (client, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkin {
    pub id: CheckinId,
    pub client_id: ClientId,
    pub date: NaiveDate,
    pub metrics: Metrics,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or amending the check-in of one day.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinInput {
    pub date: NaiveDate,
    pub metrics: Metrics,
    pub notes: Option<String>,
}

/// Cursor-paginated range scan over one client's check-ins.
///
/// Results are ordered newest first; `cursor` is the date of the last
/// item on the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinQuery {
    pub client_id: ClientId,
    pub range: DateRange,
    pub limit: u32,
    pub cursor: Option<NaiveDate>,
}

/// One page of a cursor-paginated scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Result of an atomic upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted<Id> {
    pub id: Id,
    pub created: bool,
}
