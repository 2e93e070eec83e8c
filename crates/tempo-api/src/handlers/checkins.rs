//! Check-in handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tempo_core::checkin::{Checkin, CheckinInput, CheckinQuery, Metrics};
use tempo_core::ids::ClientId;
use tempo_core::range::{DateRange, format_date, parse_date};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::handlers::clients::owned_client;
use crate::idempotency::{IdempotencyKey, Snapshot};
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 30;
const MAX_LIMIT: u32 = 100;
const MAX_NOTES_LEN: usize = 2_000;

#[derive(Deserialize)]
pub struct CheckinRequest {
    pub date: String,
    pub metrics: Metrics,
    pub notes: Option<String>,
}

impl CheckinRequest {
    fn validate(self) -> Result<CheckinInput, ApiError> {
        let date = parse_date(&self.date)?;
        if self.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(ApiError::bad_request("`notes` must be at most 2000 characters"));
        }
        Ok(CheckinInput {
            date,
            metrics: self.metrics,
            notes: self.notes,
        })
    }
}

#[derive(Deserialize)]
pub struct ListCheckinsParams {
    pub from: String,
    pub to: String,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl ListCheckinsParams {
    fn into_query(self, client: ClientId) -> Result<CheckinQuery, ApiError> {
        let range = DateRange::parse(&self.from, &self.to)?;
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::bad_request("`limit` must be between 1 and 100"));
        }
        let cursor = self
            .cursor
            .filter(|c| !c.is_empty())
            .map(|c| parse_date(&c))
            .transpose()?;
        Ok(CheckinQuery {
            client_id: client,
            range,
            limit,
            cursor,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinResponse {
    pub id: String,
    pub client_id: String,
    pub date: String,
    pub metrics: Metrics,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Checkin> for CheckinResponse {
    fn from(checkin: Checkin) -> Self {
        Self {
            id: checkin.id.to_string(),
            client_id: checkin.client_id.to_string(),
            date: format_date(checkin.date),
            metrics: checkin.metrics,
            notes: checkin.notes,
            created_at: checkin.created_at.to_rfc3339(),
            updated_at: checkin.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCheckinsResponse {
    pub items: Vec<CheckinResponse>,
    pub next_cursor: Option<String>,
}

pub async fn record_checkin(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    key: IdempotencyKey,
    Path(client_id): Path<String>,
    payload: Result<Json<CheckinRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let client = owned_client(&state, actor, &client_id).await?;

    // The body is only looked at once the key has missed, so a retry
    // carrying a different payload still gets the stored response.
    let route = format!("POST /clients/{}/checkins", client.id);
    let state = &state;
    state
        .idempotency
        .run(actor.coach_id, &route, key, move || async move {
            let Json(request) = payload?;
            let input = request.validate()?;
            let upserted = state.checkins.record(client.id, &input).await?;
            let status = if upserted.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            Ok(Snapshot::new(status, json!({ "checkinId": upserted.id })))
        })
        .await
}

pub async fn list_checkins(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(client_id): Path<String>,
    params: Result<Query<ListCheckinsParams>, QueryRejection>,
) -> Result<Json<ListCheckinsResponse>, ApiError> {
    let client = owned_client(&state, actor, &client_id).await?;
    let Query(params) = params?;
    let query = params.into_query(client.id)?;

    let page = state.checkins.list(&query).await?;
    Ok(Json(ListCheckinsResponse {
        items: page.items.into_iter().map(CheckinResponse::from).collect(),
        next_cursor: page.next_cursor,
    }))
}
