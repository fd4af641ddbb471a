use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::videos;
use crate::services::bounded::BoundedReader;
use crate::services::keys::{StorageKey, derive_key, thumbnail_extension, thumbnail_key};
use crate::services::probe::MediaClassifier;
use crate::services::staging::{StagedAsset, StagingStore};
use crate::services::storage::{ObjectStore, RemoteLocation};
use crate::services::videos::VideoService;

/// The only video container accepted for upload
pub const VIDEO_MEDIA_TYPE: &str = "video/mp4";
const VIDEO_EXTENSION: &str = "mp4";

/// Runs one upload from ownership check to the metadata write that publishes its URL.
///
/// Each call owns at most one [`StagedAsset`]; it is released before the call
/// returns, whichever step fails.
pub struct UploadService {
    videos: VideoService,
    staging: StagingStore,
    classifier: MediaClassifier,
    video_store: Arc<dyn ObjectStore>,
    thumbnail_store: Arc<dyn ObjectStore>,
    max_video_size: u64,
    max_thumbnail_size: u64,
}

impl UploadService {
    pub fn new(
        config: &AppConfig,
        videos: VideoService,
        classifier: MediaClassifier,
        video_store: Arc<dyn ObjectStore>,
        thumbnail_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            videos,
            staging: StagingStore::from_config(config),
            classifier,
            video_store,
            thumbnail_store,
            max_video_size: config.max_video_size,
            max_thumbnail_size: config.max_thumbnail_size,
        }
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn classifier(&self) -> &MediaClassifier {
        &self.classifier
    }

    pub fn thumbnail_store(&self) -> &dyn ObjectStore {
        &*self.thumbnail_store
    }

    /// Loads the record and checks `user_id` owns it.
    ///
    /// A missing record and a foreign record are both `Unauthorized`.
    pub async fn authorize(&self, user_id: &str, video_id: Uuid) -> Result<videos::Model, AppError> {
        match self.videos.get_video(video_id).await {
            Ok(Some(video)) if video.user_id == user_id => Ok(video),
            Ok(Some(_)) => {
                warn!("User {} tried to upload to video {} they do not own", user_id, video_id);
                Err(AppError::Unauthorized("Couldn't get video metadata".to_string()))
            }
            Ok(None) => Err(AppError::Unauthorized("Couldn't get video metadata".to_string())),
            Err(e) => {
                warn!("Video lookup failed for {}: {}", video_id, e);
                Err(AppError::Unauthorized("Couldn't get video metadata".to_string()))
            }
        }
    }

    /// Stage, classify, commit under `<landscape|portrait|other>/<random>.mp4`, then
    /// publish `video_url`.
    pub async fn upload_video<R>(
        &self,
        mut video: videos::Model,
        content_type: Option<&str>,
        reader: R,
    ) -> Result<videos::Model, AppError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let media_type = parse_media_type(content_type)?;
        if media_type != VIDEO_MEDIA_TYPE {
            return Err(AppError::UnsupportedMediaType(format!(
                "Video must be {}, got {}",
                VIDEO_MEDIA_TYPE, media_type
            )));
        }

        let mut reader = BoundedReader::new(reader, self.max_video_size);
        let mut asset = self.staging.stage(&mut reader, ".mp4").await?;
        info!("Staged {} bytes for video {}", asset.byte_length(), video.id);

        let class = self.classifier.classify(&asset).await?;
        info!("Video {} classified as {}", video.id, class);

        let key = derive_key(Some(class), VIDEO_EXTENSION)?;
        let location = commit(&*self.video_store, &key, &mut asset, &media_type).await?;
        release(asset);

        video.video_url = Some(location.url());
        self.persist(video, &location).await
    }

    /// Stage and commit under `<videoID>.<jpg|png>`, then publish `thumbnail_url`.
    pub async fn upload_thumbnail<R>(
        &self,
        mut video: videos::Model,
        content_type: Option<&str>,
        reader: R,
    ) -> Result<videos::Model, AppError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let media_type = parse_media_type(content_type)?;
        let extension = thumbnail_extension(&media_type).ok_or_else(|| {
            AppError::UnsupportedMediaType(format!(
                "Thumbnail must be image/jpeg or image/png, got {}",
                media_type
            ))
        })?;

        let mut reader = BoundedReader::new(reader, self.max_thumbnail_size);
        let mut asset = self
            .staging
            .stage(&mut reader, &format!(".{}", extension))
            .await?;
        info!("Staged {} byte thumbnail for video {}", asset.byte_length(), video.id);

        let key = thumbnail_key(&video.id, &media_type)?;
        let location = commit(&*self.thumbnail_store, &key, &mut asset, &media_type).await?;
        release(asset);

        video.thumbnail_url = Some(location.url());
        self.persist(video, &location).await
    }

    async fn persist(
        &self,
        video: videos::Model,
        location: &RemoteLocation,
    ) -> Result<videos::Model, AppError> {
        let video_id = video.id.clone();
        self.videos.update_video(video).await.map_err(|e| {
            // The object stays committed; nothing reconciles it automatically.
            error!(
                video_id = %video_id,
                orphaned_key = %location.key(),
                url = %location.url(),
                "Metadata update failed after commit: {}",
                e
            );
            AppError::Internal(format!("Couldn't save updated video data: {}", e))
        })
    }
}

/// Parses a declared `Content-Type` down to its essence, e.g. `video/mp4`.
pub fn parse_media_type(content_type: Option<&str>) -> Result<String, AppError> {
    let raw = content_type
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("No Content-Type in header".to_string()))?;

    let mime: mime::Mime = raw
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Unable to parse media type: {}", e)))?;

    Ok(mime.essence_str().to_ascii_lowercase())
}

async fn commit(
    store: &dyn ObjectStore,
    key: &StorageKey,
    asset: &mut StagedAsset,
    content_type: &str,
) -> Result<RemoteLocation, AppError> {
    let location = store
        .put_object(key.as_str(), asset, content_type)
        .await
        .map_err(|e| AppError::Commit(format!("Could not put object {}: {:#}", key, e)))?;

    info!("Committed {} bytes to {}", asset.byte_length(), location.url());
    Ok(location)
}

fn release(asset: StagedAsset) {
    let path = asset.path().to_path_buf();
    if let Err(e) = asset.close() {
        warn!("Failed to remove staged file {}: {}", path.display(), e);
    }
}
