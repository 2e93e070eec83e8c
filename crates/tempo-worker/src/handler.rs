//! Job handler that turns check-in history into a stored insight.

use crate::aggregation::{aggregate, summarize};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tempo_cache::TtlCache;
use tempo_core::checkin::{Checkin, CheckinQuery};
use tempo_core::config::WorkerSettings;
use tempo_core::insight::ComputedInsight;
use tempo_core::job::{InsightJob, JobDelivery};
use tempo_core::ports::{CheckinStore, InsightStore};
use tempo_core::range::parse_date;
use tempo_core::{Error, Result};
use tempo_queue::JobHandler;
use tracing::{debug, info, warn};

/// Bounds on the check-in scan performed for one job.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 50,
        }
    }
}

impl ScanLimits {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            max_pages: settings.max_pages.max(1),
        }
    }
}

pub struct InsightJobHandler {
    checkins: Arc<dyn CheckinStore>,
    insights: Arc<dyn InsightStore>,
    cache: TtlCache,
    limits: ScanLimits,
}

impl InsightJobHandler {
    pub fn new(
        checkins: Arc<dyn CheckinStore>,
        insights: Arc<dyn InsightStore>,
        cache: TtlCache,
        limits: ScanLimits,
    ) -> Self {
        Self {
            checkins,
            insights,
            cache,
            limits,
        }
    }

    /// Every check-in of the job's range, newest first, up to the page cap.
    async fn scan(&self, job: &InsightJob) -> Result<Vec<Checkin>> {
        let mut collected = Vec::new();
        let mut query = CheckinQuery {
            client_id: job.client_id,
            range: job.range,
            limit: self.limits.page_size,
            cursor: None,
        };

        for page_number in 1..=self.limits.max_pages {
            let page = self.checkins.query(&query).await?;
            collected.extend(page.items);

            let Some(cursor) = page.next_cursor else {
                return Ok(collected);
            };
            query.cursor = Some(parse_cursor(&cursor)?);
            debug!(page = page_number, scanned = collected.len(), "Fetched check-in page");
        }

        warn!(
            client_id = %job.client_id,
            range = %job.range,
            max_pages = self.limits.max_pages,
            scanned = collected.len(),
            "Check-in scan hit the page cap; insight covers a partial range"
        );
        Ok(collected)
    }

    /// Compute, persist and evict the cached copy. Returns the computed insight.
    pub async fn generate(&self, job: &InsightJob) -> Result<ComputedInsight> {
        let checkins = self.scan(job).await?;
        let signals = aggregate(&checkins);
        let computed = ComputedInsight {
            client_id: job.client_id,
            range: job.range,
            signals,
            summary: summarize(&signals),
        };

        let stored = self.insights.upsert(&computed).await?;
        // Readers must not keep serving the previous result.
        self.cache.invalidate(job.client_id, &job.range).await?;

        info!(
            client_id = %job.client_id,
            range = %job.range,
            insight_id = %stored.id,
            checkins = checkins.len(),
            "Insight generated"
        );
        Ok(computed)
    }
}

fn parse_cursor(cursor: &str) -> Result<NaiveDate> {
    parse_date(cursor).map_err(|_| Error::Internal(format!("store returned an invalid cursor: {cursor}")))
}

#[async_trait]
impl JobHandler for InsightJobHandler {
    async fn handle(&self, delivery: &JobDelivery) -> Result<()> {
        if delivery.name != InsightJob::NAME {
            return Err(Error::bad_request(format!("unexpected job name: {}", delivery.name)));
        }
        let job: InsightJob = delivery.decode()?;
        self.generate(&job).await.map(|_| ())
    }
}
