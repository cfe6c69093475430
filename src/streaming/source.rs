//! Local file access for direct play and produced encoder output.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::path::Path;
use tcstream_common::{Error, Result};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt};

/// Boxed reader positioned at the requested offset.
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// Source file accessor collaborator.
#[async_trait]
pub trait ResourceAccessor: Send + Sync {
    /// Current size of the file in bytes.
    async fn size(&self, path: &Path) -> Result<u64>;

    /// Last modification time.
    async fn modified(&self, path: &Path) -> Result<DateTime<Utc>>;

    /// Open the file and seek to `offset`.
    async fn open_at(&self, path: &Path, offset: u64) -> Result<SourceReader>;
}

/// [`ResourceAccessor`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFsAccessor;

fn map_not_found(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::not_found("file", path.display())
    } else {
        e.into()
    }
}

#[async_trait]
impl ResourceAccessor for LocalFsAccessor {
    async fn size(&self, path: &Path) -> Result<u64> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| map_not_found(path, e))?;
        Ok(metadata.len())
    }

    async fn modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| map_not_found(path, e))?;
        Ok(metadata.modified()?.into())
    }

    async fn open_at(&self, path: &Path, offset: u64) -> Result<SourceReader> {
        let mut file = File::open(path).await.map_err(|e| map_not_found(path, e))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::new(file))
    }
}
