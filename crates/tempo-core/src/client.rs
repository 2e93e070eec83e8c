//! Coached clients.

use crate::ids::{ClientId, CoachId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A client as seen by the coach who owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub coach_id: CoachId,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
}
