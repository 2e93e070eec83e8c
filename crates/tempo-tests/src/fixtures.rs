//! Test fixtures for creating sample data.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tempo_api::auth::{COACH_ROLE, Claims};
use tempo_core::config::Settings;
use tempo_core::ids::CoachId;

pub const TEST_JWT_SECRET: &str = "tempo-test-secret";

/// Settings for tests: a known signing secret and a generous rate limit.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth.jwt_secret = TEST_JWT_SECRET.to_string();
    settings.rate_limit.max_requests = 1_000;
    settings.worker.poll_interval_ms = 10;
    settings
}

/// A coach with a valid bearer token.
#[derive(Debug, Clone)]
pub struct CoachFixture {
    pub id: CoachId,
    pub token: String,
}

impl CoachFixture {
    pub fn new() -> Self {
        let id = CoachId::new();
        Self {
            token: Self::sign(&id.to_string(), COACH_ROLE),
            id,
        }
    }

    /// A token for the same subject with another role.
    pub fn with_role(&self, role: &str) -> String {
        Self::sign(&self.id.to_string(), role)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn sign(sub: &str, role: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: Utc::now().timestamp() + 3600,
            iss: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign test token")
    }
}

impl Default for CoachFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Request bodies for the check-in endpoints.
pub struct CheckinFixture;

impl CheckinFixture {
    pub fn body(date: &str, metrics: Value) -> Value {
        json!({ "date": date, "metrics": metrics })
    }

    /// Two days of poor recovery with weight dropping from 80 to 78.
    pub fn recovery_pair() -> [Value; 2] {
        [
            Self::body("2026-01-01", json!({ "sleep": 6, "soreness": 7, "weight": 80 })),
            Self::body("2026-01-02", json!({ "sleepHours": "6", "soreness_level": 7, "bodyweight": 78 })),
        ]
    }
}

pub fn new_client_body(name: &str) -> Value {
    json!({ "name": name, "email": format!("{}@example.com", name.to_lowercase()) })
}
