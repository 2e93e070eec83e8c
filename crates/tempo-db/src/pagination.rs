//! Cursor pagination helpers shared by the Postgres and in-memory stores.

use tempo_core::checkin::{Checkin, Page};
use tempo_core::range::format_date;

/// Smallest and largest page sizes a caller may request.
pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 100;

/// Turn a `limit + 1` over-fetch into a page.
///
/// `rows` must already be ordered newest first. If more than `limit` rows came
/// back, the extra row is dropped and the last kept date becomes the cursor.
pub fn page_from_overfetch(mut rows: Vec<Checkin>, limit: u32) -> Page<Checkin> {
    let limit = limit.clamp(MIN_LIMIT, MAX_LIMIT) as usize;
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    let next_cursor = if has_more {
        rows.last().map(|c| format_date(c.date))
    } else {
        None
    };
    Page {
        items: rows,
        next_cursor,
    }
}
