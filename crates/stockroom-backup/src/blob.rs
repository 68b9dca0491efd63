//! Blob storage for attachment payloads and uploaded backup documents.
//!
//! The restore engine only needs streamed writes and reads keyed by a flat
//! file name. [`FsBlobStore`] backs `file://` URLs with a local directory.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, BufWriter};
use tracing::debug;
use url::Url;

pub type BlobWriter = Pin<Box<dyn AsyncWrite + Send>>;
pub type BlobReader = Pin<Box<dyn AsyncBufRead + Send>>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported blob store scheme: {0}")]
    UnsupportedScheme(String),

    #[error("blob store URL is not a usable local path: {0}")]
    InvalidPath(String),

    #[error("blob IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BlobResult<T> = std::result::Result<T, BlobError>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a writer that creates (or truncates) the blob `key`.
    /// Callers must `shutdown()` the writer to flush it.
    async fn writer(&self, key: &str) -> BlobResult<BlobWriter>;

    async fn reader(&self, key: &str) -> BlobResult<BlobReader>;

    async fn exists(&self, key: &str) -> BlobResult<bool>;

    async fn delete(&self, key: &str) -> BlobResult<()>;
}

/// Blob store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: Utf8PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> BlobResult<Utf8PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.starts_with('.');
        if !valid {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn writer(&self, key: &str) -> BlobResult<BlobWriter> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).await?;
        let file = fs::File::create(&path).await?;
        debug!("Writing blob {}", path);
        Ok(Box::pin(BufWriter::new(file)))
    }

    async fn reader(&self, key: &str) -> BlobResult<BlobReader> {
        let path = self.path_for(key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Open the blob store behind `url`. Relative `file://` paths such as
/// `file://./blobs` are resolved against `base_dir`.
pub fn open_blob_store(url: &str, base_dir: &Utf8Path) -> BlobResult<Arc<dyn BlobStore>> {
    let root = match url.strip_prefix("file://") {
        Some(relative) if relative.starts_with('.') => base_dir.join(relative),
        _ => {
            let parsed = Url::parse(url)?;
            if parsed.scheme() != "file" {
                return Err(BlobError::UnsupportedScheme(parsed.scheme().to_string()));
            }
            let path = parsed
                .to_file_path()
                .map_err(|()| BlobError::InvalidPath(url.to_string()))?;
            Utf8PathBuf::from_path_buf(path)
                .map_err(|p| BlobError::InvalidPath(p.to_string_lossy().to_string()))?
        }
    };

    debug!("Opened file blob store at {}", root);
    Ok(Arc::new(FsBlobStore::new(root)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn store(dir: &TempDir) -> FsBlobStore {
        FsBlobStore::new(Utf8PathBuf::from_path_buf(dir.path().join("blobs")).unwrap())
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let blobs = store(&temp_dir);

        let mut writer = blobs.writer("photo-1.jpg").await.unwrap();
        writer.write_all(b"\x00\x01binary").await.unwrap();
        writer.shutdown().await.unwrap();

        assert!(blobs.exists("photo-1.jpg").await.unwrap());
        let mut content = Vec::new();
        blobs
            .reader("photo-1.jpg")
            .await
            .unwrap()
            .read_to_end(&mut content)
            .await
            .unwrap();
        assert_eq!(content, b"\x00\x01binary");

        blobs.delete("photo-1.jpg").await.unwrap();
        assert!(!blobs.exists("photo-1.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let blobs = store(&temp_dir);
        for key in ["../escape", "a/b", "", "..", ".hidden"] {
            assert!(
                matches!(blobs.writer(key).await, Err(BlobError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let temp_dir = TempDir::new().unwrap();
        let blobs = store(&temp_dir);
        assert!(matches!(
            blobs.reader("nope.bin").await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[test]
    fn test_open_blob_store_schemes() {
        let base = Utf8Path::new("/srv/stockroom");
        assert!(open_blob_store("file:///var/lib/blobs", base).is_ok());
        assert!(open_blob_store("file://./blobs", base).is_ok());
        assert!(matches!(
            open_blob_store("s3://bucket/prefix", base),
            Err(BlobError::UnsupportedScheme(s)) if s == "s3"
        ));
        assert!(matches!(
            open_blob_store("not a url", base),
            Err(BlobError::InvalidUrl(_))
        ));
    }
}
