//! PostgreSQL implementation of ClientRepository.

use async_trait::async_trait;
use tempo_core::client::{Client, NewClient};
use tempo_core::ids::{ClientId, CoachId};
use tempo_core::ports::ClientRepository;
use tempo_core::{Error, Result};
use sqlx::{PgPool, Row};

pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_client(r: &sqlx::postgres::PgRow) -> Client {
        Client {
            id: ClientId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            coach_id: CoachId::from_uuid(r.get::<uuid::Uuid, _>("coach_id")),
            name: r.get("name"),
            email: r.get("email"),
            created_at: r.get("created_at"),
        }
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn create(&self, coach: CoachId, client: &NewClient) -> Result<Client> {
        let row = sqlx::query(
            r#"INSERT INTO clients (id, coach_id, name, email)
               VALUES ($1, $2, $3, $4)
               RETURNING id, coach_id, name, email, created_at"#,
        )
        .bind(ClientId::new().as_uuid())
        .bind(coach.as_uuid())
        .bind(&client.name)
        .bind(&client.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self::row_to_client(&row))
    }

    async fn find_owned(&self, coach: CoachId, client: ClientId) -> Result<Option<Client>> {
        let row = sqlx::query(
            "SELECT id, coach_id, name, email, created_at FROM clients WHERE id = $1 AND coach_id = $2",
        )
        .bind(client.as_uuid())
        .bind(coach.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.as_ref().map(Self::row_to_client))
    }

    async fn list_owned(&self, coach: CoachId) -> Result<Vec<Client>> {
        let rows = sqlx::query(
            "SELECT id, coach_id, name, email, created_at FROM clients WHERE coach_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(coach.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_client).collect())
    }
}
