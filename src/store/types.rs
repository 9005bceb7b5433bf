// store/types.rs

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors reported by a change-source backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced document does not exist
    #[error("Document not found: {0}/{1}")]
    NotFound(String, Uuid),

    /// The backend rejected or failed the operation
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A document as held by the remote store: an id plus a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Doc {
    pub id: Uuid,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the given value exactly
    Eq(String, Value),
    /// Field is an array containing the given value
    ArrayContains(String, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Describes a live query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDir)>,
}

impl QueryDescriptor {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn filter_eq(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value));
        self
    }

    pub fn filter_array_contains(mut self, field: &str, value: Value) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.to_string(), value));
        self
    }

    pub fn order_by(mut self, field: &str, dir: SortDir) -> Self {
        self.order_by = Some((field.to_string(), dir));
        self
    }
}

/// One delivery on a live query: a full result snapshot, or a listen failure.
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    Snapshot(Vec<Doc>),
    Error(String),
}

/// Live query handle. Dropping the receiver unsubscribes; the store prunes
/// watchers whose receiver is gone on the next delivery.
pub type Subscription = mpsc::UnboundedReceiver<SnapshotEvent>;

/// Sentinel understood by the store: replaced with the server clock at commit.
pub const SERVER_TIMESTAMP_SENTINEL: &str = "$serverTimestamp";

/// Field value requesting a server-assigned timestamp.
pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP_SENTINEL.to_string())
}

pub(crate) fn is_server_timestamp(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == SERVER_TIMESTAMP_SENTINEL)
}

/// Decodes a snapshot into entities, skipping documents that fail to decode.
/// A malformed document is someone else's bug; it must not take the whole
/// snapshot down with it.
pub fn decode_docs<T: DeserializeOwned>(docs: Vec<Doc>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value(doc.data) {
            Ok(entity) => Some(entity),
            Err(e) => {
                log::warn!("Skipping malformed document {}: {}", doc.id, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Probe {
        n: i32,
    }

    #[test]
    fn decode_skips_malformed_documents() {
        let docs = vec![
            Doc {
                id: Uuid::new_v4(),
                data: json!({"n": 1}),
            },
            Doc {
                id: Uuid::new_v4(),
                data: json!({"n": "not a number"}),
            },
            Doc {
                id: Uuid::new_v4(),
                data: json!({"n": 3}),
            },
        ];

        let decoded: Vec<Probe> = decode_docs(docs);
        assert_eq!(decoded, vec![Probe { n: 1 }, Probe { n: 3 }]);
    }

    #[test]
    fn query_builder_accumulates_clauses() {
        let q = QueryDescriptor::collection("messages")
            .filter_eq("chat_room_id", json!("abc"))
            .order_by("time", SortDir::Asc);

        assert_eq!(q.collection, "messages");
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.order_by, Some(("time".to_string(), SortDir::Asc)));
    }
}
