pub mod chat_room;
pub mod message;
pub mod user;

pub use chat_room::{canonical_pair, ChatRoom, LastMessage};
pub use message::{DeliveryStatus, Message, MessageType};
pub use user::User;
