//! Client handlers.

use axum::extract::rejection::JsonRejection;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tempo_core::client::{Client, NewClient};
use tempo_core::ids::ClientId;

use crate::auth::Actor;
use crate::error::ApiError;
use crate::idempotency::{IdempotencyKey, Snapshot};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 200;

#[derive(Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub email: Option<String>,
}

impl CreateClientRequest {
    fn validate(self) -> Result<NewClient, ApiError> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(ApiError::bad_request("`name` must be 1-200 characters"));
        }
        let email = self.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        if email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(ApiError::bad_request("`email` is not a valid address"));
        }
        Ok(NewClient {
            name: name.to_string(),
            email,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: String,
}

impl From<&Client> for ClientResponse {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id.to_string(),
            name: client.name.clone(),
            email: client.email.clone(),
            created_at: client.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct ListClientsResponse {
    pub clients: Vec<ClientResponse>,
}

#[derive(Serialize)]
pub struct ClientEnvelope {
    pub client: ClientResponse,
}

/// Resolve `raw` to a client the actor owns.
///
/// Malformed, unknown and foreign ids all come back as the same NotFound.
pub async fn owned_client(state: &AppState, actor: Actor, raw: &str) -> Result<Client, ApiError> {
    let not_found = || ApiError::not_found("Client not found");
    let client_id: ClientId = raw.parse().map_err(|_| not_found())?;
    state
        .clients
        .find_owned(actor.coach_id, client_id)
        .await?
        .ok_or_else(not_found)
}

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    key: IdempotencyKey,
    payload: Result<Json<CreateClientRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let state = &state;
    state
        .idempotency
        .run(actor.coach_id, "POST /clients", key, move || async move {
            let Json(request) = payload?;
            let new_client = request.validate()?;
            let client = state.clients.create(actor.coach_id, &new_client).await?;
            Ok(Snapshot::new(StatusCode::CREATED, json!({ "clientId": client.id })))
        })
        .await
}

pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<ListClientsResponse>, ApiError> {
    let clients = state.clients.list_owned(actor.coach_id).await?;
    Ok(Json(ListClientsResponse {
        clients: clients.iter().map(ClientResponse::from).collect(),
    }))
}

pub async fn get_client(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(client_id): Path<String>,
) -> Result<Json<ClientEnvelope>, ApiError> {
    let client = owned_client(&state, actor, &client_id).await?;
    Ok(Json(ClientEnvelope {
        client: ClientResponse::from(&client),
    }))
}
