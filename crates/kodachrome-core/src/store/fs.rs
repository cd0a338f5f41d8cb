use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{Result, StoreError, StoredPolicy, Upload, MAX_NAME_ATTEMPTS};
use crate::config::StoreConfig;
use crate::names::NicknameGenerator;

/// Filesystem-backed policy store.
///
/// Layout: `<store_dir>/<nickname><ext>`. Files are only ever created, never
/// rewritten or deleted once saved.
pub struct PolicyStore {
    config: StoreConfig,
    names: Arc<dyn NicknameGenerator>,
}

impl PolicyStore {
    /// Create a store rooted at `config.store_dir`, creating it if needed.
    pub fn new(config: StoreConfig, names: Arc<dyn NicknameGenerator>) -> Result<Self> {
        std::fs::create_dir_all(&config.store_dir).map_err(|source| StoreError::SaveIo {
            path: config.store_dir.clone(),
            source,
        })?;
        Ok(Self { config, names })
    }

    pub fn store_dir(&self) -> &Path {
        &self.config.store_dir
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.config.allowed_extensions
    }

    /// Path a policy with `nickname` and `ext` (e.g. `.kinfer`) is stored at.
    pub fn path_for(&self, nickname: &str, ext: &str) -> PathBuf {
        self.config.store_dir.join(format!("{nickname}{ext}"))
    }

    /// Return the canonical allowed extension for `filename`, if any.
    pub fn accepted_extension(&self, filename: &str) -> Option<&str> {
        let ext = Path::new(filename).extension()?.to_str()?;
        let dotted = format!(".{}", ext.to_ascii_lowercase());
        self.config
            .allowed_extensions
            .iter()
            .find(|allowed| **allowed == dotted)
            .map(String::as_str)
    }

    /// Validate, name and persist an upload.
    ///
    /// On success exactly one new file exists in the store directory; on any
    /// failure none is left behind.
    pub async fn save(&self, upload: &mut dyn Upload) -> Result<StoredPolicy> {
        let ext = self
            .accepted_extension(upload.filename())
            .ok_or_else(|| StoreError::InvalidFileType {
                allowed: self.config.allowed_extensions.clone(),
            })?
            .to_string();

        let (nickname, path) = self.reserve_name(&ext).await?;

        // create_new: a concurrent save that raced us to the same name fails
        // here instead of overwriting the other file.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| StoreError::SaveIo {
                path: path.clone(),
                source,
            })?;

        let written = match upload.write_to(&mut file).await {
            Ok(n) => file.flush().await.map(|_| n),
            Err(e) => Err(e),
        };
        drop(file);

        match written {
            Ok(0) => {
                discard_partial(&path).await;
                Err(StoreError::EmptyUpload {
                    filename: upload.filename().to_string(),
                })
            }
            Ok(bytes) => {
                debug!(nickname = %nickname, bytes, "policy written");
                Ok(StoredPolicy {
                    nickname,
                    path,
                    bytes,
                })
            }
            Err(source) => {
                discard_partial(&path).await;
                Err(StoreError::SaveIo { path, source })
            }
        }
    }

    /// Draw nicknames until one is free for `ext`.
    async fn reserve_name(&self, ext: &str) -> Result<(String, PathBuf)> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let nickname = self.names.generate();
            let path = self.path_for(&nickname, ext);
            let taken = tokio::fs::try_exists(&path)
                .await
                .map_err(|source| StoreError::SaveIo {
                    path: path.clone(),
                    source,
                })?;
            if !taken {
                return Ok((nickname, path));
            }
            debug!(nickname = %nickname, "nickname already taken");
        }
        Err(StoreError::NameExhaustion {
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial upload");
        }
    }
}
