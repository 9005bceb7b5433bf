use std::collections::HashMap;

use log::info;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{canonical_pair, ChatRoom, User};
use crate::store::{server_timestamp, ChangeSource, QueryDescriptor, StoreError, CHATROOMS_COLLECTION};

#[derive(Error, Debug)]
pub enum CreateChatError {
    #[error("A chatroom already exists for these users")]
    Duplicate,
    #[error("Cannot create a chatroom with yourself")]
    SelfChat,
    #[error("Chatroom creation failed: {0}")]
    Store(#[from] StoreError),
}

/// Creates the single chatroom for the pair `{me, other}`.
///
/// The pair is canonically ordered before both the existence check and the
/// write, so two users racing to create the same room run the identical
/// query and target the identical `users` value regardless of argument
/// order. The check-then-write itself is as atomic as the store's
/// `get_once`/`write` pair.
pub async fn create_chat<S: ChangeSource>(
    store: &S,
    me: &User,
    other: &User,
) -> Result<ChatRoom, CreateChatError> {
    if me.id == other.id {
        return Err(CreateChatError::SelfChat);
    }

    let pair = canonical_pair(me.id, other.id);
    let existing = store
        .get_once(
            QueryDescriptor::collection(CHATROOMS_COLLECTION).filter_eq("users", json!(pair)),
        )
        .await?;
    if !existing.is_empty() {
        return Err(CreateChatError::Duplicate);
    }

    let mut users_data = HashMap::new();
    users_data.insert(me.id, me.clone());
    users_data.insert(other.id, other.clone());

    let room = ChatRoom {
        id: Uuid::new_v4(),
        users: pair,
        users_data,
        // Resolved by the store at commit; subscribers see the real value.
        timestamp: None,
        last_message: None,
        last_message_time: None,
    };

    let mut data = serde_json::to_value(&room)
        .map_err(|e| CreateChatError::Store(StoreError::Backend(e.to_string())))?;
    data["timestamp"] = server_timestamp();
    store.write(CHATROOMS_COLLECTION, Some(room.id), data).await?;

    info!("Created chatroom {} for users {:?}", room.id, room.users);
    Ok(room)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn test_user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            avatar_url: format!("https://avatars.example/{name}.png"),
            bio: None,
            is_online: false,
            last_active: None,
        }
    }

    async fn rooms_in_store(store: &MemoryStore) -> Vec<ChatRoom> {
        let docs = store
            .get_once(QueryDescriptor::collection(CHATROOMS_COLLECTION))
            .await
            .unwrap();
        crate::store::decode_docs(docs)
    }

    #[tokio::test]
    async fn creates_a_room_with_both_snapshots_and_no_summary() {
        let store = MemoryStore::new();
        let me = test_user("Me");
        let other = test_user("Ada");

        let room = create_chat(&store, &me, &other).await.unwrap();
        assert_eq!(room.users, canonical_pair(me.id, other.id));
        assert!(room.last_message.is_none());
        assert_eq!(room.users_data.len(), 2);

        let stored = rooms_in_store(&store).await;
        assert_eq!(stored.len(), 1);
        assert!(stored[0].timestamp.is_some());
        assert!(stored[0].last_message.is_none());
    }

    #[tokio::test]
    async fn duplicate_is_rejected_in_either_argument_order() {
        let store = MemoryStore::new();
        let me = test_user("Me");
        let other = test_user("Ada");

        create_chat(&store, &me, &other).await.unwrap();

        let same_order = create_chat(&store, &me, &other).await;
        assert!(matches!(same_order, Err(CreateChatError::Duplicate)));

        // The historic duplicate check compared the pair in creation order
        // and missed the swapped case; canonical ordering must catch it.
        let swapped = create_chat(&store, &other, &me).await;
        assert!(matches!(swapped, Err(CreateChatError::Duplicate)));

        assert_eq!(rooms_in_store(&store).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creation_yields_exactly_one_room() {
        let store = MemoryStore::new();
        let me = test_user("Me");
        let other = test_user("Ada");

        let (a, b) = tokio::join!(
            create_chat(&store, &me, &other),
            create_chat(&store, &other, &me),
        );
        assert!(a.is_ok() != b.is_ok(), "exactly one side must win");
        assert_eq!(rooms_in_store(&store).await.len(), 1);
    }

    #[tokio::test]
    async fn self_chat_is_rejected() {
        let store = MemoryStore::new();
        let me = test_user("Me");
        let result = create_chat(&store, &me, &me).await;
        assert!(matches!(result, Err(CreateChatError::SelfChat)));
        assert!(rooms_in_store(&store).await.is_empty());
    }
}
