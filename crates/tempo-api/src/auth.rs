//! Bearer token authentication for coaches.
//!
//! Tokens are HS256 JWTs whose `sub` is the coach id and whose `role` is
//! `coach`. Issuance happens elsewhere; this module only verifies.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::Request;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempo_core::config::AuthSettings;
use tempo_core::ids::CoachId;
use tracing::debug;

pub const COACH_ROLE: &str = "coach";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub coach_id: CoachId,
}

pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Resolve a token to its coach, or `None` if it is not an acceptable coach token.
    pub fn verify(&self, token: &str) -> Option<Actor> {
        let claims = match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "Rejected bearer token");
                return None;
            }
        };
        if claims.role != COACH_ROLE {
            debug!(role = %claims.role, "Rejected token role");
            return None;
        }
        let coach_id = claims.sub.parse::<CoachId>().ok()?;
        Some(Actor { coach_id })
    }
}

/// Verify the bearer token and attach the [`Actor`] to the request.
pub async fn require_coach(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let actor = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .and_then(|auth| state.verifier.verify(auth.token()))
        .ok_or_else(ApiError::unauthorized)?;

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .copied()
            .ok_or_else(ApiError::unauthorized)
    }
}
