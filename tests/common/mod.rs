#![allow(dead_code)]

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use axum::Router;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;
use tubely::config::AppConfig;
use tubely::infrastructure::database::run_migrations;
use tubely::infrastructure::storage::setup_thumbnail_storage;
use tubely::services::probe::{Geometry, MediaClassifier, MediaProbe};
use tubely::services::staging::StagedAsset;
use tubely::services::storage::{ObjectStore, RemoteLocation};
use tubely::services::upload_service::UploadService;
use tubely::services::videos::VideoService;
use tubely::utils::auth::create_jwt;
use tubely::{AppState, create_app};

pub const SECRET: &str = "test-secret";
pub const BUCKET: &str = "bucket";
pub const REGION: &str = "region";
pub const BOUNDARY: &str = "---------------------------tubelyboundary0123456789";

/// In-memory object store that hands out S3-style locations
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    puts: AtomicUsize,
    fail: bool,
}

impl MemoryObjectStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Dereferences a URL previously returned for this store
    pub fn get_by_url(&self, url: &str) -> Option<Vec<u8>> {
        let prefix = format!("https://{}.s3.{}.amazonaws.com/", BUCKET, REGION);
        let key = url.strip_prefix(&prefix)?;
        self.get(key).map(|(bytes, _)| bytes)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        asset: &mut StagedAsset,
        content_type: &str,
    ) -> Result<RemoteLocation> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("connection reset by peer");
        }

        asset.rewind().await?;
        let mut bytes = Vec::new();
        asset.file_mut().read_to_end(&mut bytes).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));

        Ok(self.location(key))
    }

    fn location(&self, key: &str) -> RemoteLocation {
        RemoteLocation::S3 {
            bucket: BUCKET.to_string(),
            region: REGION.to_string(),
            key: key.to_string(),
        }
    }

    async fn health_check(&self) -> bool {
        !self.fail
    }
}

/// Wraps a store and wipes the metadata table once the object is committed
pub struct WipingStore {
    pub inner: Arc<dyn ObjectStore>,
    pub db: DatabaseConnection,
}

#[async_trait]
impl ObjectStore for WipingStore {
    async fn put_object(
        &self,
        key: &str,
        asset: &mut StagedAsset,
        content_type: &str,
    ) -> Result<RemoteLocation> {
        let location = self.inner.put_object(key, asset, content_type).await?;
        self.db.execute_unprepared("DELETE FROM videos").await?;
        Ok(location)
    }

    fn location(&self, key: &str) -> RemoteLocation {
        self.inner.location(key)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Reports a fixed geometry for every file
pub struct FakeProbe(pub Geometry);

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<Geometry> {
        if !path.exists() {
            bail!("staged file {} is missing", path.display());
        }
        Ok(self.0)
    }
}

/// Behaves like a probe binary that cannot be executed
pub struct BrokenProbe;

#[async_trait]
impl MediaProbe for BrokenProbe {
    async fn probe(&self, _path: &Path) -> Result<Geometry> {
        Err(anyhow!("ffprobe exited with status 127"))
    }

    async fn is_available(&self) -> bool {
        false
    }
}

/// Accepts the staged file, signals `entered`, then never answers
pub struct StalledProbe {
    pub entered: Arc<Notify>,
}

#[async_trait]
impl MediaProbe for StalledProbe {
    async fn probe(&self, path: &Path) -> Result<Geometry> {
        if !path.exists() {
            bail!("staged file {} is missing", path.display());
        }
        self.entered.notify_one();
        std::future::pending().await
    }
}

pub fn portrait() -> Arc<dyn MediaProbe> {
    Arc::new(FakeProbe(Geometry {
        width: 1080,
        height: 1920,
    }))
}

pub fn landscape() -> Arc<dyn MediaProbe> {
    Arc::new(FakeProbe(Geometry {
        width: 1920,
        height: 1080,
    }))
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub videos: VideoService,
    pub store: Arc<MemoryObjectStore>,
    pub staging: TempDir,
    pub assets: TempDir,
}

impl TestApp {
    pub fn staging_entries(&self) -> Vec<PathBuf> {
        dir_entries(self.staging.path())
    }

    pub fn token(&self, user_id: &str) -> String {
        create_jwt(user_id, SECRET, chrono::Duration::hours(1)).unwrap()
    }

    pub async fn create_video(&self, owner: &str) -> tubely::entities::videos::Model {
        self.videos
            .create_video(owner, "Boots on the ground", Some("a test video"))
            .await
            .unwrap()
    }
}

pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

pub async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    run_migrations(&db).await.unwrap();
    db
}

pub fn test_config(staging: &TempDir, assets: &TempDir) -> AppConfig {
    AppConfig {
        jwt_secret: SECRET.to_string(),
        staging_dir: Some(staging.path().to_path_buf()),
        assets_root: assets.path().to_path_buf(),
        ..AppConfig::default()
    }
}

pub async fn setup() -> TestApp {
    setup_with(portrait(), |_| {}).await
}

/// Builds the app around an in-memory store and the given probe.
pub async fn setup_with(probe: Arc<dyn MediaProbe>, tweak: impl FnOnce(&mut AppConfig)) -> TestApp {
    setup_with_store(probe, Arc::new(MemoryObjectStore::default()), tweak, |_, store| store).await
}

pub async fn setup_with_store(
    probe: Arc<dyn MediaProbe>,
    store: Arc<MemoryObjectStore>,
    tweak: impl FnOnce(&mut AppConfig),
    wrap: impl FnOnce(&DatabaseConnection, Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
) -> TestApp {
    let staging = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    let mut config = test_config(&staging, &assets);
    tweak(&mut config);

    let db = test_db().await;
    let video_store = wrap(&db, store.clone());
    let thumbnail_store = setup_thumbnail_storage(&config, video_store.clone())
        .await
        .unwrap();

    let videos = VideoService::new(db.clone());
    let upload_service = Arc::new(UploadService::new(
        &config,
        videos.clone(),
        MediaClassifier::new(probe),
        video_store.clone(),
        thumbnail_store,
    ));

    let state = AppState {
        db,
        video_store,
        upload_service,
        config,
    };

    TestApp {
        app: create_app(state.clone()),
        state,
        videos,
        store,
        staging,
        assets,
    }
}

/// Single-part multipart body; `content_type` of `None` omits the part header.
pub fn multipart_body(field: &str, filename: &str, content_type: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    if let Some(ct) = content_type {
        body.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
