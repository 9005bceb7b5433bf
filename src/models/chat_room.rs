use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::User;

/// Pairing of exactly two users plus a summary of their latest exchange.
/// `users` is always in canonical order; at most one room exists per
/// unordered user pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub users: [Uuid; 2],
    /// Denormalized user snapshots taken at creation. A cache, not a live
    /// join: later profile edits are not reflected here.
    pub users_data: HashMap<Uuid, User>,
    /// Creation time, server-assigned. `None` until the store resolves it.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    /// Bumped on every send; recency sorting prefers it over `timestamp`.
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastMessage {
    pub text: String,
    pub unread: bool,
}

impl ChatRoom {
    pub fn counterpart_id(&self, my_id: Uuid) -> Option<Uuid> {
        self.users.iter().copied().find(|id| *id != my_id)
    }

    /// The other user's snapshot from `users_data`.
    pub fn counterpart(&self, my_id: Uuid) -> Option<&User> {
        self.users_data
            .iter()
            .find(|(id, _)| **id != my_id)
            .map(|(_, user)| user)
    }

    /// Sort key for recency: last activity, else creation time, else epoch 0
    /// (which sorts a room with no resolved timestamp last).
    pub fn activity_time(&self) -> DateTime<Utc> {
        self.last_message_time
            .or(self.timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn has_unread(&self) -> bool {
        self.last_message.as_ref().map(|m| m.unread).unwrap_or(false)
    }
}

/// Sorts two user ids into canonical order so the one-room-per-pair check is
/// independent of which side initiates creation.
pub fn canonical_pair(a: Uuid, b: Uuid) -> [Uuid; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}
