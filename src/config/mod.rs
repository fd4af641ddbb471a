use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where thumbnails are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailStorage {
    /// Written under `assets_root` and served from `/assets`
    Local,
    /// Same bucket as videos
    S3,
}

impl FromStr for ThumbnailStorage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "disk" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(format!("unknown thumbnail storage: {}", other)),
        }
    }
}

/// Process-wide service configuration, built once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HMAC secret used to validate bearer tokens
    pub jwt_secret: String,

    /// Metadata database URL (default: "sqlite::memory:")
    pub database_url: String,

    /// Host advertised in local asset URLs (default: "localhost")
    pub host: String,

    /// HTTP port (default: 8091)
    pub port: u16,

    /// Object store bucket for committed assets
    pub s3_bucket: String,

    /// Object store region (default: "us-east-1")
    pub s3_region: String,

    /// Custom endpoint for S3-compatible stores such as MinIO
    pub s3_endpoint: Option<String>,

    /// Root directory for locally stored assets (default: "./assets")
    pub assets_root: PathBuf,

    /// Scratch directory for staged uploads (default: OS temp dir)
    pub staging_dir: Option<PathBuf>,

    /// Maximum video body in bytes (default: 1 GiB)
    pub max_video_size: u64,

    /// Maximum thumbnail body in bytes (default: 10 MiB)
    pub max_thumbnail_size: u64,

    /// Probe executable (default: "ffprobe")
    pub ffprobe_path: String,

    /// Thumbnail backend (default: local)
    pub thumbnail_storage: ThumbnailStorage,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "secret".to_string(),
            database_url: "sqlite::memory:".to_string(),
            host: "localhost".to_string(),
            port: 8091,
            s3_bucket: "tubely-assets".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            assets_root: PathBuf::from("./assets"),
            staging_dir: None,
            max_video_size: 1 << 30,      // 1 GiB
            max_thumbnail_size: 10 << 20, // 10 MiB
            ffprobe_path: "ffprobe".to_string(),
            thumbnail_storage: ThumbnailStorage::Local,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            host: env::var("HOST").unwrap_or(default.host),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            s3_bucket: env::var("S3_BUCKET").unwrap_or(default.s3_bucket),

            s3_region: env::var("S3_REGION").unwrap_or(default.s3_region),

            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),

            assets_root: env::var("ASSETS_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.assets_root),

            staging_dir: env::var("STAGING_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),

            max_video_size: env::var("MAX_VIDEO_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_video_size),

            max_thumbnail_size: env::var("MAX_THUMBNAIL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_thumbnail_size),

            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or(default.ffprobe_path),

            thumbnail_storage: env::var("THUMBNAIL_STORAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.thumbnail_storage),
        }
    }

    /// Create config for development (local thumbnails, MinIO endpoint)
    pub fn development() -> Self {
        Self {
            jwt_secret: "dev-secret".to_string(),
            s3_endpoint: Some("http://127.0.0.1:9000".to_string()),
            ..Self::default()
        }
    }

    /// Base URL under which locally stored assets are served
    pub fn assets_base_url(&self) -> String {
        format!("http://{}:{}/assets", self.host, self.port)
    }
}
