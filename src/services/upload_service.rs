use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ChatConfig;
use crate::store::object_storage::ObjectStorage;
use crate::utils::attachment_validator::{AttachmentError, AttachmentValidator};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload failed: {0}")]
    Failed(String),
}

/// A file picked from the local device.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

/// Local preview of an accepted file. Produced without any network call.
#[derive(Debug, Clone)]
pub struct AttachmentPreview {
    pub mime: String,
    pub bytes: Bytes,
}

/// In-flight upload. `progress` moves monotonically through `0..=100`.
/// Dropping the task abandons the result without aborting the transfer;
/// a completion nobody reads is simply discarded.
pub struct UploadTask {
    pub progress: watch::Receiver<u8>,
    handle: JoinHandle<Result<String, UploadError>>,
}

impl UploadTask {
    /// Waits for completion and yields the durable URL.
    pub async fn join(self) -> Result<String, UploadError> {
        self.handle
            .await
            .map_err(|e| UploadError::Failed(format!("upload task died: {e}")))?
    }
}

/// Validates local files and streams them to object storage.
pub struct AttachmentUploader<O: ObjectStorage> {
    storage: Arc<O>,
    validator: AttachmentValidator,
    key_prefix: String,
}

impl<O: ObjectStorage> AttachmentUploader<O> {
    pub fn new(storage: Arc<O>, config: &ChatConfig) -> Self {
        Self {
            storage,
            validator: AttachmentValidator::new(config.max_attachment_bytes),
            key_prefix: config.upload_key_prefix.clone(),
        }
    }

    /// Accepts or rejects a picked file, synchronously. On acceptance the
    /// caller gets a preview to render while deciding whether to upload.
    pub fn select_file(&self, file: &LocalFile) -> Result<AttachmentPreview, AttachmentError> {
        self.validator.validate(&file.mime, file.bytes.len() as u64)?;
        Ok(AttachmentPreview {
            mime: file.mime.clone(),
            bytes: file.bytes.clone(),
        })
    }

    /// Starts streaming `file` to object storage under a timestamp-prefixed
    /// key, so repeated uploads of the same filename never collide.
    pub fn upload(&self, file: LocalFile) -> UploadTask {
        let key = format!(
            "{}/{}-{}",
            self.key_prefix,
            Utc::now().timestamp_millis(),
            file.name
        );
        let (tx, rx) = watch::channel(0u8);
        let storage = self.storage.clone();

        let handle = tokio::spawn(async move {
            match storage.put(&key, file.bytes, tx).await {
                Ok(url) => {
                    info!("Uploaded attachment to {url}");
                    Ok(url)
                }
                Err(e) => {
                    warn!("Attachment upload for key {key} failed: {e}");
                    Err(UploadError::Failed(e.to_string()))
                }
            }
        });

        UploadTask {
            progress: rx,
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryObjectStorage;

    fn png_of_size(len: usize) -> LocalFile {
        LocalFile {
            name: "cat.png".to_string(),
            mime: "image/png".to_string(),
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    fn uploader() -> (Arc<MemoryObjectStorage>, AttachmentUploader<MemoryObjectStorage>) {
        let storage = Arc::new(MemoryObjectStorage::new());
        let uploader = AttachmentUploader::new(storage.clone(), &ChatConfig::default());
        (storage, uploader)
    }

    #[tokio::test]
    async fn select_file_gates_on_type_and_size() {
        let (_, uploader) = uploader();

        let preview = uploader.select_file(&png_of_size(1024)).unwrap();
        assert!(!preview.bytes.is_empty());
        assert_eq!(preview.mime, "image/png");

        let oversized = png_of_size(6 * 1024 * 1024);
        assert!(matches!(
            uploader.select_file(&oversized),
            Err(AttachmentError::TooLarge { .. })
        ));

        let text = LocalFile {
            name: "notes.txt".to_string(),
            mime: "text/plain".to_string(),
            bytes: Bytes::from_static(b"hello"),
        };
        assert!(matches!(
            uploader.select_file(&text),
            Err(AttachmentError::UnsupportedType(_))
        ));
    }

    #[tokio::test]
    async fn upload_reports_monotonic_progress_and_yields_a_url() {
        let (storage, uploader) = uploader();

        let task = uploader.upload(png_of_size(300 * 1024));
        let mut progress = task.progress.clone();

        let url = task.join().await.unwrap();
        assert!(url.starts_with("memory://chatroom_images/"));
        assert!(url.ends_with("-cat.png"));

        // The watch channel retains the final value; the transfer must have
        // ended at 100.
        let observed = *progress.borrow_and_update();
        assert_eq!(observed, 100);

        let key = url.strip_prefix("memory://").unwrap();
        assert_eq!(storage.object(key).unwrap().len(), 300 * 1024);
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let (_, uploader) = uploader();
        let task = uploader.upload(png_of_size(500 * 1024));
        let mut progress = task.progress.clone();

        let watcher = tokio::spawn(async move {
            let mut last = 0u8;
            while progress.changed().await.is_ok() {
                let pct = *progress.borrow();
                assert!(pct >= last, "progress went backwards: {last} -> {pct}");
                assert!(pct <= 100);
                last = pct;
            }
            last
        });

        task.join().await.unwrap();
        assert_eq!(watcher.await.unwrap(), 100);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_and_preview_state_is_untouched() {
        let (storage, uploader) = uploader();
        let file = png_of_size(1024);
        let preview = uploader.select_file(&file).unwrap();

        storage.fail_next_upload();
        let result = uploader.upload(file.clone()).join().await;
        assert!(matches!(result, Err(UploadError::Failed(_))));

        // The preview is still intact for a retry, and the retry succeeds.
        assert_eq!(preview.bytes.len(), 1024);
        let url = uploader.upload(file).join().await.unwrap();
        assert!(url.starts_with("memory://"));
    }
}
