// utils/attachment_validator.rs

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::DEFAULT_MAX_ATTACHMENT_BYTES;

/// Errors that can occur while accepting a local file for attachment
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("Unsupported attachment type: {0}")]
    UnsupportedType(String),
    #[error("Attachment is too large: {size} bytes (limit is {limit})")]
    TooLarge { size: u64, limit: u64 },
}

static IMAGE_MIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^image/[a-z0-9][a-z0-9.+-]*$").unwrap());

pub struct AttachmentValidator {
    max_bytes: u64,
}

impl Default for AttachmentValidator {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl AttachmentValidator {
    /// Creates a validator with a custom size cap
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Accepts image MIME types up to the size cap. Checked locally; a
    /// rejected file never reaches the network.
    pub fn validate(&self, mime: &str, size: u64) -> Result<(), AttachmentError> {
        let mime = mime.trim().to_ascii_lowercase();
        if !IMAGE_MIME_REGEX.is_match(&mime) {
            return Err(AttachmentError::UnsupportedType(mime));
        }
        if size > self.max_bytes {
            return Err(AttachmentError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}
