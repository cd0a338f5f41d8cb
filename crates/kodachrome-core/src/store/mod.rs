//! Policy upload storage.
//!
//! An [`Upload`] is a streamed attachment plus the filename it was declared
//! with. [`PolicyStore`](fs::PolicyStore) validates it, picks a free nickname
//! and persists it as `{store_dir}/{nickname}{ext}`.

pub mod fs;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub use fs::PolicyStore;

/// Maximum nickname draws before giving up.
pub const MAX_NAME_ATTEMPTS: usize = 100;

/// Errors from saving an upload.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid file type: must be one of {}", .allowed.join(", "))]
    InvalidFileType { allowed: Vec<String> },

    #[error("Failed to generate a unique policy name after {attempts} attempts")]
    NameExhaustion { attempts: usize },

    #[error("uploaded file {filename} is empty")]
    EmptyUpload { filename: String },

    #[error("failed to save policy at {}: {source}", .path.display())]
    SaveIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A policy file that was written successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPolicy {
    pub nickname: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Incoming attachment.
///
/// Implementations stream their body into `sink` instead of buffering the
/// whole payload, so large policies do not have to fit in memory.
#[async_trait]
pub trait Upload: Send {
    /// Filename as declared by the uploader.
    fn filename(&self) -> &str;

    /// Copy the payload into `sink`, returning the number of bytes written.
    async fn write_to(&mut self, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> std::io::Result<u64>;
}

/// Upload whose body is already in memory.
#[derive(Debug, Clone)]
pub struct MemoryUpload {
    filename: String,
    body: Vec<u8>,
}

impl MemoryUpload {
    pub fn new(filename: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
impl Upload for MemoryUpload {
    fn filename(&self) -> &str {
        &self.filename
    }

    async fn write_to(&mut self, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> std::io::Result<u64> {
        sink.write_all(&self.body).await?;
        Ok(self.body.len() as u64)
    }
}
