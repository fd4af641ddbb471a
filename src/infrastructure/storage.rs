use crate::config::{AppConfig, ThumbnailStorage};
use crate::services::storage::{LocalObjectStore, ObjectStore, S3ObjectStore};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_storage(config: &AppConfig) -> Arc<S3ObjectStore> {
    let mut loader = aws_config::from_env().region(Region::new(config.s3_region.clone()));
    if let Some(endpoint) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;

    // S3-compatible stores behind a custom endpoint usually need path-style addressing
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.s3_endpoint.is_some())
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    info!(
        "☁️  S3 Storage: bucket={} region={} endpoint={}",
        config.s3_bucket,
        config.s3_region,
        config.s3_endpoint.as_deref().unwrap_or("aws")
    );

    let store = S3ObjectStore::new(s3_client, config.s3_bucket.clone(), config.s3_region.clone());
    if store.health_check().await {
        info!("✅ Bucket '{}' is reachable", config.s3_bucket);
    } else {
        warn!(
            "⚠️  Bucket '{}' is not reachable yet; uploads will fail until it is",
            config.s3_bucket
        );
    }

    Arc::new(store)
}

/// Picks the thumbnail backend; the S3 mode shares the video store.
pub async fn setup_thumbnail_storage(
    config: &AppConfig,
    video_store: Arc<dyn ObjectStore>,
) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.thumbnail_storage {
        ThumbnailStorage::S3 => {
            info!("🖼️  Thumbnails: object store");
            Ok(video_store)
        }
        ThumbnailStorage::Local => {
            tokio::fs::create_dir_all(&config.assets_root).await?;
            info!(
                "🖼️  Thumbnails: {} served at {}",
                config.assets_root.display(),
                config.assets_base_url()
            );
            Ok(Arc::new(LocalObjectStore::new(
                config.assets_root.clone(),
                config.assets_base_url(),
            )))
        }
    }
}
