use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Server-assigned send time, the ordering key. `None` only while this is
    /// an optimistic local echo whose timestamp has not resolved yet.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
    pub message_type: MessageType,
    /// Local delivery state; never crosses the store boundary.
    #[serde(skip)]
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryStatus {
    Pending,
    #[default]
    Confirmed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decoded_messages_are_confirmed() {
        let msg: Message = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "chat_room_id": Uuid::new_v4(),
            "sender_id": Uuid::new_v4(),
            "content": "hi",
            "time": "2026-03-01T09:30:00Z",
            "message_type": "text",
        }))
        .unwrap();

        assert_eq!(msg.status, DeliveryStatus::Confirmed);
        assert!(!msg.read);
        assert!(msg.image.is_none());
    }

    #[test]
    fn delivery_status_is_not_serialized() {
        let msg = Message {
            id: Uuid::new_v4(),
            chat_room_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi".into(),
            image: None,
            time: None,
            read: false,
            message_type: MessageType::Text,
            status: DeliveryStatus::Pending,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("status").is_none());
    }
}
