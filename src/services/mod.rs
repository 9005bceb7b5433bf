pub mod chatroom_service;
pub mod message_service;
pub mod presence_service;
pub mod roster_service;
pub mod upload_service;
