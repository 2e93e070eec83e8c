//! PostgreSQL implementation of InsightStore.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tempo_core::ids::{ClientId, InsightId};
use tempo_core::insight::{ComputedInsight, Insight, InsightSignals};
use tempo_core::ports::InsightStore;
use tempo_core::range::DateRange;
use tempo_core::{Error, Result};

const COLUMNS: &str = "id, client_id, range_start, range_end, avg_sleep, avg_soreness, weight_delta, summary, created_at, updated_at";

pub struct PgInsightStore {
    pool: PgPool,
}

impl PgInsightStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_insight(r: &sqlx::postgres::PgRow) -> Result<Insight> {
        Ok(Insight {
            id: InsightId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            client_id: ClientId::from_uuid(r.get::<uuid::Uuid, _>("client_id")),
            range: DateRange::new(r.get("range_start"), r.get("range_end"))?,
            signals: InsightSignals {
                avg_sleep: r.get("avg_sleep"),
                avg_soreness: r.get("avg_soreness"),
                weight_delta: r.get("weight_delta"),
            },
            summary: r.get("summary"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        })
    }
}

#[async_trait]
impl InsightStore for PgInsightStore {
    async fn upsert(&self, insight: &ComputedInsight) -> Result<Insight> {
        let sql = format!(
            r#"INSERT INTO insights (id, client_id, range_start, range_end, avg_sleep, avg_soreness, weight_delta, summary)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (client_id, range_start, range_end) DO UPDATE
               SET avg_sleep = EXCLUDED.avg_sleep,
                   avg_soreness = EXCLUDED.avg_soreness,
                   weight_delta = EXCLUDED.weight_delta,
                   summary = EXCLUDED.summary,
                   updated_at = now()
               RETURNING {COLUMNS}"#
        );
        let row = sqlx::query(&sql)
            .bind(InsightId::new().as_uuid())
            .bind(insight.client_id.as_uuid())
            .bind(insight.range.start)
            .bind(insight.range.end)
            .bind(insight.signals.avg_sleep)
            .bind(insight.signals.avg_soreness)
            .bind(insight.signals.weight_delta)
            .bind(&insight.summary)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Self::row_to_insight(&row)
    }

    async fn find(&self, client: ClientId, range: DateRange) -> Result<Option<Insight>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM insights WHERE client_id = $1 AND range_start = $2 AND range_end = $3"
        );
        let row = sqlx::query(&sql)
            .bind(client.as_uuid())
            .bind(range.start)
            .bind(range.end)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.as_ref().map(Self::row_to_insight).transpose()
    }
}
