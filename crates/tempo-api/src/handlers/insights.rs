//! Insight handlers.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempo_core::insight::Insight;
use tempo_core::range::DateRange;

use crate::auth::Actor;
use crate::error::ApiError;
use crate::handlers::clients::owned_client;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RangeParams {
    pub from: String,
    pub to: String,
}

impl RangeParams {
    fn range(&self) -> Result<DateRange, ApiError> {
        Ok(DateRange::parse(&self.from, &self.to)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedResponse {
    pub job_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightResponse {
    pub id: String,
    pub client_id: String,
    pub from: String,
    pub to: String,
    pub avg_sleep: Option<f64>,
    pub avg_soreness: Option<f64>,
    pub weight_delta: Option<f64>,
    pub summary: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Insight> for InsightResponse {
    fn from(insight: Insight) -> Self {
        Self {
            id: insight.id.to_string(),
            client_id: insight.client_id.to_string(),
            from: insight.range.start_str(),
            to: insight.range.end_str(),
            avg_sleep: insight.signals.avg_sleep,
            avg_soreness: insight.signals.avg_soreness,
            weight_delta: insight.signals.weight_delta,
            summary: insight.summary,
            created_at: insight.created_at.to_rfc3339(),
            updated_at: insight.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct InsightEnvelope {
    pub insight: InsightResponse,
}

/// Schedule (or join) the computation for a range. Answers before it runs.
pub async fn request_insight(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(client_id): Path<String>,
    payload: Result<Json<RangeParams>, JsonRejection>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    let client = owned_client(&state, actor, &client_id).await?;
    let Json(params) = payload?;
    let range = params.range()?;

    let handle = state.insights.request(client.id, range).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            job_id: handle.id.to_string(),
        }),
    ))
}

/// NotFound until a worker has stored a result for exactly this range.
pub async fn get_insight(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(client_id): Path<String>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<InsightEnvelope>, ApiError> {
    let client = owned_client(&state, actor, &client_id).await?;
    let Query(params) = params?;
    let range = params.range()?;

    let insight = state
        .insights
        .get(client.id, range)
        .await?
        .ok_or_else(|| ApiError::not_found("Insight not found"))?;
    Ok(Json(InsightEnvelope {
        insight: InsightResponse::from(insight),
    }))
}
