use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use super::types::{Doc, QueryDescriptor, StoreError, Subscription};

/// Capability contract for the remote document store.
///
/// Implementations deliver a full result snapshot on every matching change.
/// Snapshot arrival order across collections carries no guarantee; consumers
/// re-derive ordering from document fields, never from delivery order.
pub trait ChangeSource: Send + Sync + 'static {
    /// Opens a live query. The returned channel yields an initial snapshot
    /// followed by one snapshot per matching change. Dropping the receiver
    /// ends the subscription.
    fn subscribe(&self, query: QueryDescriptor) -> Subscription;

    /// One-shot query, no listener registered.
    fn get_once(
        &self,
        query: QueryDescriptor,
    ) -> impl Future<Output = Result<Vec<Doc>, StoreError>> + Send;

    /// Creates or replaces a document. When `id` is `None` the store assigns
    /// one. Top-level fields holding the server-timestamp sentinel are
    /// resolved against the store clock at commit.
    fn write(
        &self,
        collection: &str,
        id: Option<Uuid>,
        data: Value,
    ) -> impl Future<Output = Result<Uuid, StoreError>> + Send;

    /// Merges `patch`'s top-level fields into an existing document.
    fn update(
        &self,
        collection: &str,
        id: Uuid,
        patch: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
