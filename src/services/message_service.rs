use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{DeliveryStatus, Message, MessageType, User};
use crate::store::{
    decode_docs, server_timestamp, ChangeSource, QueryDescriptor, SnapshotEvent, SortDir,
    StoreError, CHATROOMS_COLLECTION, MESSAGES_COLLECTION,
};
use crate::utils::timeline;

/// Lifecycle of the chatroom selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomPhase {
    #[default]
    Unselected,
    Subscribing,
    Live,
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("No chatroom is selected")]
    NoActiveRoom,
    #[error("Failed to encode message: {0}")]
    Encode(String),
    #[error("Failed to write message: {0}")]
    Write(#[from] StoreError),
}

/// Outcome of a successful send. `summary_stale` is set when the message was
/// durably written but the chatroom summary update failed afterwards; the
/// roster row lags until the next send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Uuid,
    pub summary_stale: bool,
}

/// One calendar day of messages, in send order.
#[derive(Debug, Clone)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub label: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default)]
struct MessageState {
    phase: RoomPhase,
    chat_room_id: Option<Uuid>,
    /// Confirmed messages, ascending by server time. Rebuilt from each
    /// snapshot; arrival order is never trusted.
    messages: Vec<Message>,
    /// Optimistic local echoes awaiting their confirmed counterpart.
    pending: Vec<Message>,
    degraded: bool,
}

/// Owns the live message view for the currently selected chatroom.
///
/// At most one room is live at a time. Selection teardown bumps a generation
/// counter checked inside the subscription task, so a late delivery from a
/// previous room can never touch the new room's state even while the old
/// task unwinds.
pub struct MessageSynchronizer<S: ChangeSource> {
    store: Arc<S>,
    me: User,
    state: Arc<RwLock<MessageState>>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl<S: ChangeSource> MessageSynchronizer<S> {
    pub fn new(store: Arc<S>, me: User) -> Self {
        Self {
            store,
            me,
            state: Arc::new(RwLock::new(MessageState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Switches the live view to `chat_room_id`. The previous subscription
    /// is torn down first; there is never more than one active listener.
    pub fn select_room(&mut self, chat_room_id: Uuid) {
        self.deselect();

        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
            st.phase = RoomPhase::Subscribing;
            st.chat_room_id = Some(chat_room_id);
        }

        let mut rx = self.store.subscribe(
            QueryDescriptor::collection(MESSAGES_COLLECTION)
                .filter_eq("chat_room_id", json!(chat_room_id))
                .order_by("time", SortDir::Asc),
        );
        let state = self.state.clone();
        let generation = self.generation.clone();

        self.task = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut st = state.write().unwrap_or_else(|e| e.into_inner());
                // Stale-callback guard: a teardown or reselect that raced
                // this delivery must win.
                if generation.load(Ordering::SeqCst) != gen
                    || st.chat_room_id != Some(chat_room_id)
                {
                    break;
                }
                match event {
                    SnapshotEvent::Snapshot(docs) => {
                        let mut messages: Vec<Message> = decode_docs(docs);
                        messages.retain(|m| m.chat_room_id == chat_room_id);
                        // The snapshot is authoritative: re-sort by server
                        // time rather than trusting delivery order.
                        messages.sort_by_key(|m| (m.time, m.id));
                        messages.dedup_by_key(|m| m.id);

                        let confirmed: HashSet<Uuid> = messages.iter().map(|m| m.id).collect();
                        st.pending.retain(|p| !confirmed.contains(&p.id));
                        st.messages = messages;
                        st.phase = RoomPhase::Live;
                        st.degraded = false;
                    }
                    SnapshotEvent::Error(e) => {
                        warn!("Message subscription error for room {chat_room_id}: {e}");
                        st.degraded = true;
                    }
                }
            }
        }));
    }

    /// Leaves the current room. All message state is dropped; the
    /// subscription task is cancelled and its generation invalidated.
    pub fn deselect(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
        *st = MessageState::default();
    }

    /// Sends a message to the selected room. A blank message with no image
    /// is a no-op that never reaches the store.
    ///
    /// The pipeline is: optimistic local echo, store write with a
    /// server-assigned timestamp, then the chatroom summary update. A failed
    /// write removes the echo and surfaces the error; a failed summary
    /// update leaves the durably-sent message alone and flags the receipt.
    pub async fn send(
        &self,
        content: &str,
        image: Option<String>,
    ) -> Result<Option<SendReceipt>, SendError> {
        let chat_room_id = {
            let st = self.state.read().unwrap_or_else(|e| e.into_inner());
            st.chat_room_id.ok_or(SendError::NoActiveRoom)?
        };

        if content.trim().is_empty() && image.is_none() {
            debug!("Ignoring empty send for room {chat_room_id}");
            return Ok(None);
        }

        let message = Message {
            id: Uuid::new_v4(),
            chat_room_id,
            sender_id: self.me.id,
            content: content.to_string(),
            message_type: if image.is_some() {
                MessageType::Image
            } else {
                MessageType::Text
            },
            image,
            time: None,
            read: false,
            status: DeliveryStatus::Pending,
        };

        let mut data =
            serde_json::to_value(&message).map_err(|e| SendError::Encode(e.to_string()))?;
        data["time"] = server_timestamp();

        {
            let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
            st.pending.push(message.clone());
        }

        if let Err(e) = self
            .store
            .write(MESSAGES_COLLECTION, Some(message.id), data)
            .await
        {
            let mut st = self.state.write().unwrap_or_else(|e| e.into_inner());
            st.pending.retain(|p| p.id != message.id);
            return Err(SendError::Write(e));
        }

        let summary_text = if message.content.trim().is_empty() {
            "Image".to_string()
        } else {
            message.content.clone()
        };
        let patch = json!({
            "last_message": { "text": summary_text, "unread": true },
            "last_message_time": server_timestamp(),
        });
        let summary_stale = match self
            .store
            .update(CHATROOMS_COLLECTION, chat_room_id, patch)
            .await
        {
            Ok(()) => false,
            // At-least-sent: the message is durable, only the roster summary
            // lags. Not rolled back.
            Err(e) => {
                warn!("Message {} sent but summary update failed: {e}", message.id);
                true
            }
        };

        Ok(Some(SendReceipt {
            message_id: message.id,
            summary_stale,
        }))
    }

    pub fn phase(&self) -> RoomPhase {
        self.state.read().unwrap_or_else(|e| e.into_inner()).phase
    }

    pub fn chat_room_id(&self) -> Option<Uuid> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .chat_room_id
    }

    pub fn degraded(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).degraded
    }

    /// Confirmed messages, ascending by server time.
    pub fn messages(&self) -> Vec<Message> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .messages
            .clone()
    }

    /// Optimistic echoes not yet confirmed by a snapshot.
    pub fn pending(&self) -> Vec<Message> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .clone()
    }

    /// Confirmed messages followed by pending echoes, partitioned by
    /// calendar day for display.
    pub fn grouped_by_day(&self) -> Vec<DayGroup> {
        let merged = {
            let st = self.state.read().unwrap_or_else(|e| e.into_inner());
            let mut merged = st.messages.clone();
            merged.extend(st.pending.iter().cloned());
            merged
        };
        group_messages(&merged, Utc::now())
    }
}

impl<S: ChangeSource> Drop for MessageSynchronizer<S> {
    fn drop(&mut self) {
        self.deselect();
    }
}

/// Partitions messages by the viewer-local calendar day of their send time.
/// A message without a resolved server time (a pending echo) falls into the
/// bucket for `now`. Flattening the groups in order yields the input
/// sequence exactly.
pub fn group_messages(messages: &[Message], now: DateTime<Utc>) -> Vec<DayGroup> {
    let today = timeline::local_day(now);
    let mut groups: Vec<DayGroup> = Vec::new();
    for message in messages {
        let date = timeline::local_day(message.time.unwrap_or(now));
        match groups.last_mut() {
            Some(group) if group.date == date => group.messages.push(message.clone()),
            _ => groups.push(DayGroup {
                date,
                label: timeline::day_label(date, today),
                messages: vec![message.clone()],
            }),
        }
    }
    groups
}
