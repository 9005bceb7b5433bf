use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    /// Optional profile text; absent on accounts created before the field
    /// existed.
    #[serde(default)]
    pub bio: Option<String>,
    /// Advisory presence flag, maintained by the presence tracker. May be
    /// stale if the session ended without a termination signal.
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}
