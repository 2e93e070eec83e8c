//! PostgreSQL implementation of CheckinStore.

use crate::pagination::{MAX_LIMIT, MIN_LIMIT, page_from_overfetch};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tempo_core::checkin::{Checkin, CheckinInput, CheckinQuery, Metrics, Page, Upserted};
use tempo_core::ids::{CheckinId, ClientId};
use tempo_core::ports::CheckinStore;
use tempo_core::{Error, Result};

pub struct PgCheckinStore {
    pool: PgPool,
}

impl PgCheckinStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_checkin(r: &sqlx::postgres::PgRow) -> Result<Checkin> {
        let metrics = match r.get::<serde_json::Value, _>("metrics") {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => Metrics::new(),
            other => {
                return Err(Error::Serialization(format!(
                    "checkin metrics is not an object: {other}"
                )));
            }
        };

        Ok(Checkin {
            id: CheckinId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            client_id: ClientId::from_uuid(r.get::<uuid::Uuid, _>("client_id")),
            date: r.get("date"),
            metrics,
            notes: r.get("notes"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        })
    }
}

#[async_trait]
impl CheckinStore for PgCheckinStore {
    async fn upsert(&self, client: ClientId, input: &CheckinInput) -> Result<Upserted<CheckinId>> {
        // xmax is 0 only for a freshly inserted row version.
        let row = sqlx::query(
            r#"INSERT INTO checkins (id, client_id, date, metrics, notes)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (client_id, date) DO UPDATE
               SET metrics = checkins.metrics || EXCLUDED.metrics,
                   notes = COALESCE(EXCLUDED.notes, checkins.notes),
                   updated_at = now()
               RETURNING id, (xmax = 0) AS created"#,
        )
        .bind(CheckinId::new().as_uuid())
        .bind(client.as_uuid())
        .bind(input.date)
        .bind(serde_json::Value::Object(input.metrics.clone()))
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Upserted {
            id: CheckinId::from_uuid(row.get::<uuid::Uuid, _>("id")),
            created: row.get("created"),
        })
    }

    async fn query(&self, query: &CheckinQuery) -> Result<Page<Checkin>> {
        let limit = query.limit.clamp(MIN_LIMIT, MAX_LIMIT);
        let rows = sqlx::query(
            r#"SELECT id, client_id, date, metrics, notes, created_at, updated_at
               FROM checkins
               WHERE client_id = $1
                 AND date >= $2 AND date <= $3
                 AND ($4::date IS NULL OR date < $4)
               ORDER BY date DESC, id DESC
               LIMIT $5"#,
        )
        .bind(query.client_id.as_uuid())
        .bind(query.range.start)
        .bind(query.range.end)
        .bind(query.cursor)
        .bind(i64::from(limit) + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let items = rows
            .iter()
            .map(Self::row_to_checkin)
            .collect::<Result<Vec<_>>>()?;
        Ok(page_from_overfetch(items, limit))
    }
}
