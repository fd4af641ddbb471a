use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::services::staging::StagedAsset;

/// Where a committed object can be retrieved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLocation {
    S3 {
        bucket: String,
        region: String,
        key: String,
    },
    Local {
        base_url: String,
        key: String,
    },
}

impl RemoteLocation {
    pub fn key(&self) -> &str {
        match self {
            RemoteLocation::S3 { key, .. } | RemoteLocation::Local { key, .. } => key,
        }
    }

    /// Public retrieval URL
    pub fn url(&self) -> String {
        match self {
            RemoteLocation::S3 {
                bucket,
                region,
                key,
            } => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
            RemoteLocation::Local { base_url, key } => {
                format!("{}/{}", base_url.trim_end_matches('/'), key)
            }
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes the staged file, from byte 0, under `key`. Either the whole object is
    /// acknowledged or an error is returned.
    async fn put_object(
        &self,
        key: &str,
        asset: &mut StagedAsset,
        content_type: &str,
    ) -> Result<RemoteLocation>;

    fn location(&self, key: &str) -> RemoteLocation;

    async fn health_check(&self) -> bool;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String, region: String) -> Self {
        Self {
            client,
            bucket,
            region,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        asset: &mut StagedAsset,
        content_type: &str,
    ) -> Result<RemoteLocation> {
        let body = ByteStream::from_path(asset.path())
            .await
            .with_context(|| format!("unable to open {} for upload", asset.path().display()))?;

        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(asset.byte_length() as i64)
            .body(body)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 put_object failed: bucket={}, key={}, error={:?}",
                self.bucket,
                key,
                e
            );
            return Err(e.into());
        }

        Ok(self.location(key))
    }

    fn location(&self, key: &str) -> RemoteLocation {
        RemoteLocation::S3 {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            key: key.to_string(),
        }
    }

    async fn health_check(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}

/// Stores objects as files under a root directory served at `base_url`
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: String) -> Self {
        Self {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
            bail!("invalid storage key: {}", key);
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(
        &self,
        key: &str,
        asset: &mut StagedAsset,
        _content_type: &str,
    ) -> Result<RemoteLocation> {
        let dest = self.key_to_path(key)?;
        let parent = dest.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("unable to create {}", parent.display()))?;

        // Write next to the destination, then rename into place
        let (file, temp_path) = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(&parent)?
            .into_parts();
        let mut out = tokio::fs::File::from_std(file);

        asset.rewind().await?;
        let written = tokio::io::copy(asset.file_mut(), &mut out).await?;
        out.flush().await?;
        out.sync_all().await?;
        drop(out);

        if written != asset.byte_length() {
            bail!(
                "short write for {}: {} of {} bytes",
                key,
                written,
                asset.byte_length()
            );
        }

        temp_path
            .persist(&dest)
            .with_context(|| format!("unable to move object into {}", dest.display()))?;

        Ok(self.location(key))
    }

    fn location(&self, key: &str) -> RemoteLocation {
        RemoteLocation::Local {
            base_url: self.base_url.clone(),
            key: key.to_string(),
        }
    }

    async fn health_check(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}
