use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::services::bounded::is_size_limit_exceeded;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWriteExt};

const STAGING_PREFIX: &str = "tubely-upload-";

/// An upload copied to a private scratch file.
///
/// Dropping the asset closes the handle and unlinks the file, so every exit path of
/// the owning call cleans up. Fields drop in order: handle first, then the path.
#[derive(Debug)]
pub struct StagedAsset {
    file: File,
    path: TempPath,
    byte_length: u64,
}

impl StagedAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Moves the read cursor back to byte 0.
    pub async fn rewind(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).await.map(|_| ())
    }

    /// Closes the handle and removes the file, reporting removal errors that a plain
    /// drop would swallow.
    pub fn close(self) -> std::io::Result<()> {
        let Self { file, path, .. } = self;
        drop(file);
        path.close()
    }
}

pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.staging_dir.clone().unwrap_or_else(std::env::temp_dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `reader` to a fresh temp file and rewinds it.
    ///
    /// A [`SizeLimitExceeded`](crate::services::bounded::SizeLimitExceeded) raised by
    /// the reader surfaces as `PayloadTooLarge`; any other failure is `Io`. The
    /// partially written file is removed before returning in both cases.
    pub async fn stage<R>(&self, reader: &mut R, suffix: &str) -> Result<StagedAsset, AppError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Io(format!("Unable to prepare scratch directory: {}", e)))?;

        let temp_file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.dir)
            .map_err(|e| AppError::Io(format!("Unable to create temporary file: {}", e)))?;

        let (file, path) = temp_file.into_parts();
        let mut asset = StagedAsset {
            file: File::from_std(file),
            path,
            byte_length: 0,
        };

        let copied = tokio::io::copy(reader, &mut asset.file)
            .await
            .map_err(|e| {
                if is_size_limit_exceeded(&e) {
                    AppError::PayloadTooLarge(e.to_string())
                } else {
                    AppError::Io(format!("Unable to copy to temporary file: {}", e))
                }
            })?;

        asset
            .file
            .flush()
            .await
            .map_err(|e| AppError::Io(format!("Unable to flush temporary file: {}", e)))?;
        asset
            .rewind()
            .await
            .map_err(|e| AppError::Io(format!("Unable to reset temp file pointer: {}", e)))?;

        asset.byte_length = copied;
        tracing::debug!(
            "Staged {} bytes at {}",
            asset.byte_length,
            asset.path().display()
        );

        Ok(asset)
    }
}
