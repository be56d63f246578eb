//! src/services/file_store.rs
//!
//! Blob storage for product photos. `FileStore` is the seam the catalog
//! service depends on; `DiskFileStore` keeps payloads on local disk sharded
//! beneath `base_path/{directory}/{shard}/{shard}/{uuid}.{ext}`.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_STORED_PATH_LEN: usize = 300;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("invalid stored path `{0}`")]
    InvalidPath(String),
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

/// Binary storage addressed by opaque relative paths.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` under `directory` and return the new path.
    async fn save(
        &self,
        bytes: Bytes,
        directory: &str,
        extension: Option<&str>,
    ) -> FileStoreResult<String>;

    /// Remove a stored file. Removing a path that no longer exists succeeds.
    async fn delete(&self, path: &str) -> FileStoreResult<()>;

    /// Public URL under which `path` can be fetched. Pure and deterministic.
    fn url_for(&self, path: &str) -> String;
}

/// Local-disk `FileStore`.
#[derive(Clone, Debug)]
pub struct DiskFileStore {
    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,

    /// Prefix for URLs handed out by `url_for`, e.g. `http://localhost:3000`.
    pub public_base_url: String,
}

impl DiskFileStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Open a stored file for streaming out.
    pub async fn open(&self, path: &str) -> FileStoreResult<File> {
        ensure_path_safe(path)?;
        File::open(self.base_path.join(path))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => FileStoreError::NotFound(path.to_string()),
                _ => FileStoreError::Io(err),
            })
    }

    /// Two-level shard identifiers from MD5(file_name), lowercase hex 00–ff.
    fn shards(file_name: &str) -> (String, String) {
        let digest = md5::compute(file_name);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Remove empty directories from `start` up to, but excluding, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    /// Write to a temp file, fsync, then rename into place so readers never
    /// observe a partial photo.
    async fn save(
        &self,
        bytes: Bytes,
        directory: &str,
        extension: Option<&str>,
    ) -> FileStoreResult<String> {
        ensure_path_safe(directory)?;

        let file_name = match extension {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let (shard_a, shard_b) = Self::shards(&file_name);
        let rel_path = format!("{}/{}/{}/{}", directory, shard_a, shard_b, file_name);
        ensure_path_safe(&rel_path)?;

        let file_path = self.base_path.join(&rel_path);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            FileStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "stored path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = write_synced(&tmp_path, &bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(FileStoreError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(FileStoreError::Io(err));
        }

        debug!(path = %rel_path, size = bytes.len(), "stored file");
        Ok(rel_path)
    }

    async fn delete(&self, path: &str) -> FileStoreResult<()> {
        ensure_path_safe(path)?;
        let file_path = self.base_path.join(path);

        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(FileStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            // Keep the logical directory itself, prune only the shard levels.
            let top = path.split('/').next().unwrap_or_default();
            let stop = self.base_path.join(top);
            self.prune_empty_dirs(parent, &stop).await;
        }

        Ok(())
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/files/{}", self.public_base_url, path)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Reject stored paths that could escape the base directory.
///
/// Paths come back from clients through `/files/{*path}`, so they get the
/// same treatment as any untrusted key.
fn ensure_path_safe(path: &str) -> FileStoreResult<()> {
    let invalid = || FileStoreError::InvalidPath(path.to_string());
    if path.is_empty() || path.len() > MAX_STORED_PATH_LEN {
        return Err(invalid());
    }
    if path.starts_with('/') || path.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return Err(invalid());
    }
    if path
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b':')
    {
        return Err(invalid());
    }
    Ok(())
}
