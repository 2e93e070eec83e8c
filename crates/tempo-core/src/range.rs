//! Calendar dates and inclusive date ranges.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a strict `YYYY-MM-DD` date.
///
/// Rejects unpadded components and impossible dates such as `2026-02-30`.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    if raw.len() != 10 {
        return Err(Error::bad_request(format!("Invalid date: {raw}")));
    }
    let date = NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| Error::bad_request(format!("Invalid date: {raw}")))?;
    if date.format(DATE_FORMAT).to_string() != raw {
        return Err(Error::bad_request(format!("Invalid date: {raw}")));
    }
    Ok(date)
}

/// Format a date the way it is stored and keyed.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Inclusive range of calendar days.
///
/// Serialized as `{"from": "...", "to": "..."}`; deserialization re-checks ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct DateRange {
    #[serde(rename = "from")]
    pub start: NaiveDate,
    #[serde(rename = "to")]
    pub end: NaiveDate,
}

#[derive(Deserialize)]
struct RawRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl TryFrom<RawRange> for DateRange {
    type Error = Error;

    fn try_from(raw: RawRange) -> Result<Self> {
        DateRange::new(raw.from, raw.to)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::bad_request("`from` must be <= `to`"));
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from request strings.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn start_str(&self) -> String {
        format_date(self.start)
    }

    pub fn end_str(&self) -> String {
        format_date(self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_str(), self.end_str())
    }
}
