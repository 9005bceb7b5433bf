// app_state.rs

use std::sync::Arc;

use log::{info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::models::{ChatRoom, User};
use crate::services::message_service::MessageSynchronizer;
use crate::services::presence_service::PresenceTracker;
use crate::services::roster_service::RosterSynchronizer;
use crate::store::{
    decode_docs, AuthEvent, ChangeSource, IdentityProvider, QueryDescriptor, StoreError,
    USERS_COLLECTION,
};

/// Which pane the interface shows. Navigation is this one value, rendered
/// declaratively; nothing toggles element visibility by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaneView {
    /// Chat list / user list
    #[default]
    ShowRoster,
    /// The selected conversation
    ShowChat,
    /// Signed in, nothing selected yet
    ShowEmpty,
}

/// The chatroom the user is looking at, with both denormalized snapshots.
#[derive(Debug, Clone)]
pub struct SelectedChatRoom {
    pub id: Uuid,
    pub my_data: User,
    pub other_data: User,
}

/// Top-level session controller: owns the authenticated user, the pane
/// state, the current selection, and the per-session services. All state
/// transitions flow through here; services never reach into each other.
pub struct ChatApp<S: ChangeSource> {
    store: Arc<S>,
    config: ChatConfig,
    pane: PaneView,
    me: Option<User>,
    selected: Option<SelectedChatRoom>,
    roster: Option<RosterSynchronizer<S>>,
    presence: Option<PresenceTracker<S>>,
    messages: Option<MessageSynchronizer<S>>,
}

impl<S: ChangeSource> ChatApp<S> {
    pub fn new(store: Arc<S>, config: ChatConfig) -> Self {
        Self {
            store,
            config,
            pane: PaneView::ShowRoster,
            me: None,
            selected: None,
            roster: None,
            presence: None,
            messages: None,
        }
    }

    /// Drives the controller from the identity provider's auth stream.
    /// Returns when the stream closes.
    pub async fn run_auth<I: IdentityProvider>(&mut self, identity: &I) {
        let mut rx = identity.subscribe_auth();
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle_auth_event(event).await {
                warn!("Auth transition failed: {e}");
            }
        }
    }

    /// Applies one auth transition. Sign-in resolves the user document,
    /// marks presence, and starts the roster; sign-out tears everything
    /// down.
    pub async fn handle_auth_event(&mut self, event: AuthEvent) -> Result<(), StoreError> {
        match event {
            AuthEvent::SignedIn(user_id) => self.sign_in(user_id).await,
            AuthEvent::SignedOut => {
                self.sign_out().await;
                Ok(())
            }
        }
    }

    async fn sign_in(&mut self, user_id: Uuid) -> Result<(), StoreError> {
        if self.me.as_ref().map(|u| u.id) == Some(user_id) {
            return Ok(());
        }
        // A different principal signed in underneath us; drop the old
        // session first.
        if self.me.is_some() {
            self.sign_out().await;
        }

        let docs = self
            .store
            .get_once(
                QueryDescriptor::collection(USERS_COLLECTION).filter_eq("id", json!(user_id)),
            )
            .await?;
        let me = decode_docs::<User>(docs)
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(USERS_COLLECTION.to_string(), user_id))?;

        let presence = PresenceTracker::new(self.store.clone(), user_id);
        presence.mark_online().await;

        let mut roster = RosterSynchronizer::new(self.store.clone(), user_id);
        roster.start();

        self.messages = Some(MessageSynchronizer::new(self.store.clone(), me.clone()));
        self.presence = Some(presence);
        self.roster = Some(roster);
        self.me = Some(me);
        self.pane = PaneView::ShowEmpty;

        info!("Session started for user {user_id}");
        Ok(())
    }

    /// Ends the session: every live subscription is detached before state is
    /// cleared, and the offline mark is best-effort.
    pub async fn sign_out(&mut self) {
        if let Some(mut roster) = self.roster.take() {
            roster.stop();
        }
        if let Some(mut messages) = self.messages.take() {
            messages.deselect();
        }
        if let Some(presence) = self.presence.take() {
            presence.mark_offline().await;
        }
        self.me = None;
        self.selected = None;
        self.pane = PaneView::ShowRoster;
    }

    /// Opens a conversation. A room whose `users_data` is missing the
    /// counterpart is malformed and is ignored rather than opened half-blank.
    pub fn open_chat(&mut self, room: &ChatRoom) {
        let Some(me) = self.me.clone() else {
            warn!("Ignoring open_chat with no signed-in user");
            return;
        };
        let Some(other) = room.counterpart(me.id).cloned() else {
            warn!("Chatroom {} has no counterpart snapshot; not opening", room.id);
            return;
        };
        let Some(messages) = self.messages.as_mut() else {
            return;
        };

        messages.select_room(room.id);
        self.selected = Some(SelectedChatRoom {
            id: room.id,
            my_data: me,
            other_data: other,
        });
        self.pane = PaneView::ShowChat;
    }

    /// Returns to the roster (the mobile back action). The message
    /// subscription ends with the selection.
    pub fn close_chat(&mut self) {
        if let Some(messages) = self.messages.as_mut() {
            messages.deselect();
        }
        self.selected = None;
        self.pane = PaneView::ShowRoster;
    }

    pub fn pane(&self) -> PaneView {
        self.pane
    }

    pub fn me(&self) -> Option<&User> {
        self.me.as_ref()
    }

    pub fn selected(&self) -> Option<&SelectedChatRoom> {
        self.selected.as_ref()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn roster(&self) -> Option<&RosterSynchronizer<S>> {
        self.roster.as_ref()
    }

    pub fn messages(&self) -> Option<&MessageSynchronizer<S>> {
        self.messages.as_ref()
    }

    pub fn presence(&self) -> Option<&PresenceTracker<S>> {
        self.presence.as_ref()
    }
}
