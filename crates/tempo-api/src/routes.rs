//! API route definitions.

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{Span, info};

use crate::auth::require_coach;
use crate::handlers::{checkins, clients, health, insights, plans};
use crate::middleware::{REQUEST_ID_HEADER, cors_layer, rate_limit, request_id};
use crate::state::AppState;

/// Create the main API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            let id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tempo_trace::request_span(request.method().as_str(), request.uri().path(), id)
        })
        .on_response(|response: &Response<Body>, latency: Duration, span: &Span| {
            span.record("http.status_code", response.status().as_u16());
            info!(
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                "Request finished"
            );
        });

    Router::new()
        .nest("/api/v1", api_routes(Arc::clone(&state)))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .with_state(state)
        .layer(trace)
        .layer(cors_layer())
        .layer(from_fn(request_id))
}

fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/clients", client_routes())
        .nest("/plans", plan_routes())
        .route("/workouts/{workout_id}/items", post(plans::add_item))
        // Layers run bottom-up: authenticate first, then count the request.
        .route_layer(from_fn_with_state(Arc::clone(&state), rate_limit))
        .route_layer(from_fn_with_state(state, require_coach))
}

fn client_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(clients::list_clients).post(clients::create_client))
        .route("/{client_id}", get(clients::get_client))
        .route(
            "/{client_id}/checkins",
            get(checkins::list_checkins).post(checkins::record_checkin),
        )
        .route(
            "/{client_id}/insights",
            get(insights::get_insight).post(insights::request_insight),
        )
        .route(
            "/{client_id}/plans",
            get(plans::list_plans).post(plans::create_plan),
        )
}

fn plan_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{plan_id}", get(plans::get_plan))
        .route("/{plan_id}/workouts", post(plans::add_workout))
}
