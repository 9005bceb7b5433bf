use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use log::warn;
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{ChatRoom, User};
use crate::store::{
    decode_docs, ChangeSource, QueryDescriptor, SnapshotEvent, CHATROOMS_COLLECTION,
    USERS_COLLECTION,
};

/// Sort orders for the chat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSortOrder {
    Recent,
    Unread,
    Alphabetical,
}

/// Latest reconciled roster snapshot. Replaced wholesale on every delivery;
/// derived views are recomputed from it, never patched.
#[derive(Debug, Clone, Default)]
pub struct RosterState {
    pub users: Vec<User>,
    pub chat_rooms: Vec<ChatRoom>,
    pub users_loading: bool,
    pub chats_loading: bool,
    /// Set while a subscription has reported an error; the snapshot kept is
    /// the last known good one.
    pub degraded: bool,
}

/// Owns the two session-lifetime subscriptions: all users, and the chatrooms
/// the local user belongs to.
pub struct RosterSynchronizer<S: ChangeSource> {
    store: Arc<S>,
    my_id: Uuid,
    state: Arc<RwLock<RosterState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: ChangeSource> RosterSynchronizer<S> {
    pub fn new(store: Arc<S>, my_id: Uuid) -> Self {
        Self {
            store,
            my_id,
            state: Arc::new(RwLock::new(RosterState {
                users_loading: true,
                chats_loading: true,
                ..RosterState::default()
            })),
            tasks: Vec::new(),
        }
    }

    /// Opens both subscriptions. Idempotent; a second call is a no-op.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        let users_rx = self.store.subscribe(QueryDescriptor::collection(USERS_COLLECTION));
        let state = self.state.clone();
        let my_id = self.my_id;
        self.tasks.push(tokio::spawn(async move {
            let mut rx = users_rx;
            while let Some(event) = rx.recv().await {
                let mut st = state.write().unwrap_or_else(|e| e.into_inner());
                match event {
                    SnapshotEvent::Snapshot(docs) => {
                        let users = dedupe_by_id(decode_docs::<User>(docs), |u| u.id)
                            .into_iter()
                            .filter(|u| u.id != my_id)
                            .collect();
                        st.users = users;
                        st.users_loading = false;
                        st.degraded = false;
                    }
                    SnapshotEvent::Error(e) => {
                        warn!("Users subscription error: {e}");
                        st.degraded = true;
                    }
                }
            }
        }));

        let chats_rx = self.store.subscribe(
            QueryDescriptor::collection(CHATROOMS_COLLECTION)
                .filter_array_contains("users", json!(self.my_id)),
        );
        let state = self.state.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut rx = chats_rx;
            while let Some(event) = rx.recv().await {
                let mut st = state.write().unwrap_or_else(|e| e.into_inner());
                match event {
                    SnapshotEvent::Snapshot(docs) => {
                        st.chat_rooms = dedupe_by_id(decode_docs::<ChatRoom>(docs), |r| r.id);
                        st.chats_loading = false;
                        st.degraded = false;
                    }
                    SnapshotEvent::Error(e) => {
                        warn!("Chatrooms subscription error: {e}");
                        st.degraded = true;
                    }
                }
            }
        }));
    }

    /// Detaches both subscriptions. No further snapshot mutates the state.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub fn snapshot(&self) -> RosterState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn filtered_users(&self, query: &str) -> Vec<User> {
        filter_users(&self.snapshot().users, query)
    }

    pub fn filtered_chat_rooms(&self, query: &str) -> Vec<ChatRoom> {
        filter_chat_rooms(&self.snapshot().chat_rooms, self.my_id, query)
    }

    pub fn sorted_chat_rooms(&self, order: ChatSortOrder) -> Vec<ChatRoom> {
        sort_chat_rooms(self.snapshot().chat_rooms, self.my_id, order)
    }

    /// Ids of everyone already sharing a room with me; "start chat" is
    /// suppressed for them.
    pub fn disabled_user_ids(&self) -> HashSet<Uuid> {
        disabled_user_ids(&self.snapshot().chat_rooms)
    }

    pub fn counterpart(&self, room: &ChatRoom) -> Option<User> {
        room.counterpart(self.my_id).cloned()
    }
}

impl<S: ChangeSource> Drop for RosterSynchronizer<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dedupe_by_id<T, F: Fn(&T) -> Uuid>(items: Vec<T>, id_of: F) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(id_of(item)))
        .collect()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Case-insensitive substring match over name, email, and bio.
pub fn filter_users(users: &[User], query: &str) -> Vec<User> {
    let query = query.trim().to_lowercase();
    users
        .iter()
        .filter(|u| {
            query.is_empty()
                || contains_ci(&u.name, &query)
                || contains_ci(&u.email, &query)
                || u.bio.as_deref().map(|b| contains_ci(b, &query)).unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Case-insensitive substring match over counterpart name, counterpart
/// email, and last-message text.
pub fn filter_chat_rooms(rooms: &[ChatRoom], my_id: Uuid, query: &str) -> Vec<ChatRoom> {
    let query = query.trim().to_lowercase();
    rooms
        .iter()
        .filter(|room| {
            if query.is_empty() {
                return true;
            }
            let counterpart_match = room
                .counterpart(my_id)
                .map(|u| contains_ci(&u.name, &query) || contains_ci(&u.email, &query))
                .unwrap_or(false);
            let message_match = room
                .last_message
                .as_ref()
                .map(|m| contains_ci(&m.text, &query))
                .unwrap_or(false);
            counterpart_match || message_match
        })
        .cloned()
        .collect()
}

pub fn sort_chat_rooms(mut rooms: Vec<ChatRoom>, my_id: Uuid, order: ChatSortOrder) -> Vec<ChatRoom> {
    match order {
        ChatSortOrder::Recent => {
            rooms.sort_by_key(|r| std::cmp::Reverse(r.activity_time()));
        }
        // Stable sort: unread rooms first, everything else keeps its
        // relative order.
        ChatSortOrder::Unread => {
            rooms.sort_by_key(|r| !r.has_unread());
        }
        ChatSortOrder::Alphabetical => {
            rooms.sort_by_cached_key(|r| {
                match r.counterpart(my_id) {
                    Some(u) => (false, u.name.to_lowercase()),
                    // Rooms with no counterpart snapshot sort last.
                    None => (true, String::new()),
                }
            });
        }
    }
    rooms
}

pub fn disabled_user_ids(rooms: &[ChatRoom]) -> HashSet<Uuid> {
    rooms.iter().flat_map(|r| r.users.iter().copied()).collect()
}
