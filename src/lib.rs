pub mod app_state;
pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use app_state::{ChatApp, PaneView, SelectedChatRoom};
pub use config::ChatConfig;
pub use models::{ChatRoom, Message, User};
pub use services::chatroom_service::{create_chat, CreateChatError};
pub use services::message_service::{MessageSynchronizer, RoomPhase, SendError, SendReceipt};
pub use services::presence_service::PresenceTracker;
pub use services::roster_service::{ChatSortOrder, RosterSynchronizer};
pub use services::upload_service::{AttachmentUploader, LocalFile, UploadError, UploadTask};
pub use store::{ChangeSource, IdentityProvider, ObjectStorage};
