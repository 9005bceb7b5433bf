use std::future::Future;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Upload transport error: {0}")]
    Transport(String),
}

/// Capability contract for remote object storage.
pub trait ObjectStorage: Send + Sync + 'static {
    /// Streams `data` to the given key, reporting percentage progress in
    /// `0..=100` through `progress` (monotonically non-decreasing, ending at
    /// 100 on success). Resolves to a durable fetchable URL.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        progress: watch::Sender<u8>,
    ) -> impl Future<Output = Result<String, StorageError>> + Send;
}
