pub mod change_source;
pub mod identity;
pub mod memory;
pub mod object_storage;
pub mod types;

pub use change_source::ChangeSource;
pub use identity::{AuthEvent, IdentityProvider};
pub use object_storage::ObjectStorage;
pub use types::{
    decode_docs, server_timestamp, Doc, Filter, QueryDescriptor, SnapshotEvent, SortDir,
    StoreError, Subscription,
};

/// Collection names shared with the remote store.
pub const USERS_COLLECTION: &str = "users";
pub const CHATROOMS_COLLECTION: &str = "chatrooms";
pub const MESSAGES_COLLECTION: &str = "messages";
